use proptest::prelude::*;

use gaze_backend::gaze::aoi::{classify, parse_zones};
use gaze_backend::gaze::ear::eye_aspect_ratio;
use gaze_backend::gaze::fixation::count_fixations;
use gaze_backend::gaze::report::SessionReportAggregator;
use gaze_backend::gaze::types::{FrameRecord, Point};
use gaze_backend::gaze::GazeConfig;
use gaze_backend::store::keys::{sanitize_session_id, session_key};

fn point() -> impl Strategy<Value = Point> {
    (0.0f64..1.0, 0.0f64..1.0).prop_map(|(x, y)| Point::new(x, y))
}

fn record() -> impl Strategy<Value = FrameRecord> {
    (proptest::option::of(point()), 0u8..=2, any::<bool>()).prop_map(|(gaze, eyes, blink)| {
        let mut r = FrameRecord::empty(chrono::Utc::now());
        r.eye_count = eyes;
        if eyes > 0 {
            r.gaze_x = gaze.map(|p| p.x);
            r.gaze_y = gaze.map(|p| p.y);
        }
        r.blink_event = blink;
        r
    })
}

proptest! {
    #[test]
    fn ear_is_never_negative(points in proptest::array::uniform6(point())) {
        let ear = eye_aspect_ratio(&points);
        prop_assert!(ear.is_finite() && ear >= 0.0);
    }

    #[test]
    fn report_is_deterministic(frames in proptest::collection::vec(record(), 0..40)) {
        let aggregator = SessionReportAggregator::new(&GazeConfig::default());
        let a = aggregator.aggregate("p", &frames);
        let b = aggregator.aggregate("p", &frames);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.frame_count, frames.len());
        prop_assert!(a.valid_frame_count <= a.frame_count);
        prop_assert!(a.success_rate_pct >= 0.0 && a.success_rate_pct <= 100.0);
        if let Some(stability) = a.gaze_stability {
            prop_assert!(stability >= 0.0);
        }
    }

    #[test]
    fn aoi_share_never_exceeds_one(frames in proptest::collection::vec(record(), 1..40)) {
        let report = SessionReportAggregator::new(&GazeConfig::default()).aggregate("p", &frames);
        for share in &report.aoi_distribution {
            prop_assert!(share.share >= 0.0 && share.share <= 1.0);
        }
    }

    #[test]
    fn default_zones_cover_unit_square(p in point()) {
        let zones = parse_zones(gaze_backend::constants::DEFAULT_AOI_ZONES).unwrap();
        let hits = classify(&p, &zones);
        prop_assert!(!hits.is_empty());
        prop_assert!(hits.len() <= 2);
    }

    #[test]
    fn fixations_bounded_by_points(points in proptest::collection::vec(point(), 0..60), min in 1u32..5) {
        let n = count_fixations(&points, 0.05, min);
        prop_assert!(n <= points.len() / 2 + 1);
    }

    #[test]
    fn sanitized_ids_are_safe(id in "\\PC{1,64}") {
        let clean = sanitize_session_id(&id);
        prop_assert!(clean
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'));
        prop_assert!(!clean.contains("__"));
    }

    #[test]
    fn distinct_ids_get_distinct_keys(a in "[a-z:/ ]{1,12}", b in "[a-z:/ ]{1,12}") {
        prop_assume!(a != b);
        prop_assume!(!a.trim().is_empty() && !b.trim().is_empty());
        prop_assert_ne!(session_key(&a).unwrap(), session_key(&b).unwrap());
    }
}
