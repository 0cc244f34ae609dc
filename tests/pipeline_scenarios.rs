mod common;

use std::sync::Arc;

use common::app::{spawn_test_app, spawn_with};
use common::fixtures::{frame_input, no_face_input};
use gaze_backend::config::StoreBackendKind;
use gaze_backend::gaze::types::{AttentionLabel, FrameRecord, ReportStatus};
use gaze_backend::state::AppState;
use gaze_backend::store::keys::session_key;

#[tokio::test]
async fn calibration_then_blink_detection() {
    let app = spawn_with(StoreBackendKind::Sled, 3).await;
    let engine = app.engine();

    for i in 0..3 {
        let outcome = engine
            .process_frame("cal", frame_input(0.5, 0.5, 0.6))
            .await
            .unwrap();
        assert!(outcome.record.calibrating);
        assert_eq!(outcome.calibration.is_some(), i == 2);
    }

    let meta = engine.store().meta("cal").await.unwrap().unwrap();
    let profile = meta.calibration.expect("profile persisted");
    assert!(profile.calibrated);
    assert!((profile.ear_threshold - 0.45 * 0.7).abs() < 1e-9);

    let openness = [0.6, 0.2, 0.2, 0.6];
    let mut blinks = Vec::new();
    for o in openness {
        let outcome = engine
            .process_frame("cal", frame_input(0.5, 0.5, o))
            .await
            .unwrap();
        assert!(!outcome.record.calibrating);
        assert!(outcome.record.pupil_dilation_pct.is_some());
        blinks.push(outcome.record.blink_event);
    }
    assert_eq!(blinks, vec![false, false, false, true]);

    let report = engine.generate_report("cal", None).await.unwrap();
    assert_eq!(report.blink_count, 1);
    assert_eq!(report.frame_count, 7);
}

#[tokio::test]
async fn calibration_without_faces_falls_back() {
    let app = spawn_with(StoreBackendKind::Sled, 2).await;
    let engine = app.engine();

    engine.process_frame("dark", no_face_input()).await.unwrap();
    let outcome = engine.process_frame("dark", no_face_input()).await.unwrap();

    let profile = outcome.calibration.expect("window closed");
    assert!(!profile.calibrated);
    assert!((profile.ear_threshold - 0.25).abs() < 1e-12);

    let live = engine
        .process_frame("dark", frame_input(0.5, 0.5, 0.6))
        .await
        .unwrap();
    assert!(live.record.pupil_dilation_pct.is_none());
}

#[tokio::test]
async fn restarted_engine_resumes_session_state() {
    let app = spawn_with(StoreBackendKind::File, 3).await;

    for _ in 0..4 {
        app.engine()
            .process_frame("resume", frame_input(0.5, 0.5, 0.6))
            .await
            .unwrap();
    }

    let restarted = AppState::build(&app.config).unwrap();
    let engine = restarted.engine();

    let mut last = None;
    for o in [0.2, 0.2, 0.6] {
        last = Some(
            engine
                .process_frame("resume", frame_input(0.5, 0.5, o))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(!last.record.calibrating, "calibration must not restart");
    assert!(last.record.blink_event);

    let frames = engine.session_frames("resume").await.unwrap();
    assert_eq!(frames.len(), 7);
}

#[tokio::test]
async fn alternating_detection_keeps_stability_zero() {
    let app = spawn_test_app().await;

    let frames: Vec<FrameRecord> = (0..20)
        .map(|i| {
            let mut record = FrameRecord::empty(chrono::Utc::now());
            if i % 2 == 0 {
                record.eye_count = 2;
                record.gaze_x = Some(0.5);
                record.gaze_y = Some(0.5);
                record.ear_value = Some(0.3);
            }
            record
        })
        .collect();

    let report = app
        .engine()
        .generate_report("alt", Some(frames))
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Complete);
    assert_eq!(report.frame_count, 20);
    assert_eq!(report.valid_frame_count, 10);
    assert!((report.success_rate_pct - 50.0).abs() < 1e-9);
    assert_eq!(report.gaze_stability, Some(0.0));
    assert_eq!(report.attention_label, Some(AttentionLabel::HighlyFocused));
}

#[tokio::test]
async fn ids_that_sanitize_alike_stay_separate() {
    let app = spawn_test_app().await;
    let engine = app.engine();

    let raw = "2024-01-01T10:00:00";
    let clean = "2024-01-01T10_00_00";
    assert_ne!(session_key(raw).unwrap(), session_key(clean).unwrap());

    engine
        .process_frame(raw, frame_input(0.2, 0.5, 0.6))
        .await
        .unwrap();
    for _ in 0..2 {
        engine
            .process_frame(clean, frame_input(0.8, 0.5, 0.6))
            .await
            .unwrap();
    }

    assert_eq!(engine.session_frames(raw).await.unwrap().len(), 1);
    assert_eq!(engine.session_frames(clean).await.unwrap().len(), 2);

    let ids: Vec<String> = engine
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.session_id)
        .collect();
    assert!(ids.contains(&raw.to_string()));
    assert!(ids.contains(&clean.to_string()));
}

#[tokio::test]
async fn concurrent_frames_on_one_session_are_all_kept() {
    let app = spawn_test_app().await;
    let engine = Arc::clone(app.engine());

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let x = 0.05 + i as f64 * 0.05;
            engine
                .process_frame("busy", frame_input(x, 0.5, 0.6))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let meta = engine.store().meta("busy").await.unwrap().unwrap();
    assert_eq!(meta.frame_count, 16);
    assert_eq!(engine.session_frames("busy").await.unwrap().len(), 16);
}

#[tokio::test]
async fn sweep_removes_idle_sessions() {
    let app = spawn_with(StoreBackendKind::File, 0).await;
    let engine = app.engine();

    engine
        .process_frame("old", frame_input(0.5, 0.5, 0.6))
        .await
        .unwrap();

    let kept = engine.sweep_expired(chrono::Duration::hours(1)).await.unwrap();
    assert_eq!(kept, 0);

    let removed = engine
        .sweep_expired(chrono::Duration::seconds(-1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(engine.session_frames("old").await.unwrap().is_empty());
}
