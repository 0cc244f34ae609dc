//! Session-level aggregation of the frame log into a [`SessionReport`].
//!
//! The aggregator is a pure function of the frame sequence. Frames with
//! `eye_count = 0` count toward `frame_count` but are excluded from every
//! gaze-position statistic.

use std::collections::BTreeMap;

use crate::constants::{
    ATTENTION_HIGHLY_FOCUSED_MAX, ATTENTION_NORMAL_ENGAGEMENT_MAX, PATTERN_BALANCED_MAX,
    PATTERN_CONCENTRATED_MAX,
};
use crate::gaze::config::GazeConfig;
use crate::gaze::fixation::count_fixations;
use crate::gaze::types::{
    AoiShare, AttentionLabel, AxisRange, FrameRecord, GazeRange, PatternLabel, Point,
    ReportStatus, SessionReport,
};

pub fn attention_label(gaze_stability: f64) -> AttentionLabel {
    if gaze_stability < ATTENTION_HIGHLY_FOCUSED_MAX {
        AttentionLabel::HighlyFocused
    } else if gaze_stability < ATTENTION_NORMAL_ENGAGEMENT_MAX {
        AttentionLabel::NormalEngagement
    } else {
        AttentionLabel::ActiveExploration
    }
}

pub fn pattern_label(max_axis_span: f64) -> PatternLabel {
    if max_axis_span < PATTERN_CONCENTRATED_MAX {
        PatternLabel::ConcentratedFocus
    } else if max_axis_span < PATTERN_BALANCED_MAX {
        PatternLabel::BalancedAttention
    } else {
        PatternLabel::BroadScanning
    }
}

#[derive(Debug, Clone)]
pub struct SessionReportAggregator {
    fixation_threshold: f64,
    fixation_min_frames: u32,
}

impl SessionReportAggregator {
    pub fn new(config: &GazeConfig) -> Self {
        Self {
            fixation_threshold: config.fixation_threshold,
            fixation_min_frames: config.fixation_min_frames,
        }
    }

    pub fn aggregate(&self, session_id: &str, frames: &[FrameRecord]) -> SessionReport {
        let frame_count = frames.len();
        if frame_count == 0 {
            return degraded(
                session_id,
                ReportStatus::NoData,
                0,
                0,
                "No eye tracking data collected",
                "Unable to analyze because the session contains no frames.",
                "No frames recorded for session",
            );
        }

        let valid: Vec<&FrameRecord> = frames.iter().filter(|f| f.is_valid()).collect();
        let valid_frame_count = valid.len();
        if valid_frame_count == 0 {
            return degraded(
                session_id,
                ReportStatus::NoUsableData,
                frame_count,
                0,
                "No valid eye tracking data collected",
                "Unable to analyze due to lack of valid eye detections, possibly due to poor lighting or camera positioning.",
                "No valid frames with eye detections",
            );
        }

        let gaze_points: Vec<Point> = valid.iter().filter_map(|f| f.gaze()).collect();
        if gaze_points.is_empty() {
            return degraded(
                session_id,
                ReportStatus::NoGazePoints,
                frame_count,
                valid_frame_count,
                "No valid gaze points collected",
                "Unable to analyze due to lack of valid gaze points.",
                "No valid gaze points found in data",
            );
        }

        let avg_eye_count =
            frames.iter().map(|f| f.eye_count as f64).sum::<f64>() / frame_count as f64;
        let success_rate_pct = valid_frame_count as f64 / frame_count as f64 * 100.0;

        let xs: Vec<f64> = gaze_points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = gaze_points.iter().map(|p| p.y).collect();
        let centroid = Point::new(mean(&xs), mean(&ys));
        let range = GazeRange {
            x: axis_range(&xs),
            y: axis_range(&ys),
        };
        let gaze_stability = (std_dev(&xs) + std_dev(&ys)) / 2.0;

        let fixation_count =
            count_fixations(&gaze_points, self.fixation_threshold, self.fixation_min_frames);
        let blink_count = frames.iter().filter(|f| f.blink_event).count();

        let dilations: Vec<f64> = valid.iter().filter_map(|f| f.pupil_dilation_pct).collect();
        let mean_pupil_dilation_pct = (!dilations.is_empty()).then(|| mean(&dilations));

        let attention = attention_label(gaze_stability);
        let pattern = pattern_label(range.max_span());

        let summary = format!(
            "Eye tracking analysis completed with {valid_frame_count} valid frames out of {frame_count} total frames ({success_rate_pct:.1}% success rate)"
        );
        let stats = format!(
            "Average Eyes Detected: {avg_eye_count:.2}\n\
             Gaze Position (avg): X={:.2}, Y={:.2}\n\
             Gaze Range: X={:.2}-{:.2}, Y={:.2}-{:.2}\n\
             Gaze Stability: {gaze_stability:.3}\n\
             Fixations: {fixation_count}\n\
             Blinks: {blink_count}",
            centroid.x, centroid.y, range.x.min, range.x.max, range.y.min, range.y.max,
        );
        let narrative_template = format!(
            "Analysis shows {valid_frame_count} successful eye detections out of {frame_count} frames, \
             with an average of {avg_eye_count:.1} eyes tracked per frame. \
             The gaze pattern indicates {}, based on the gaze stability measure of {gaze_stability:.3}. \
             The gaze distribution suggests {} behavior.",
            attention.as_str(),
            pattern.as_str(),
        );

        SessionReport {
            session_id: session_id.to_string(),
            status: ReportStatus::Complete,
            frame_count,
            valid_frame_count,
            success_rate_pct,
            avg_eye_count: Some(avg_eye_count),
            gaze_centroid: Some(centroid),
            gaze_range: Some(range),
            gaze_stability: Some(gaze_stability),
            fixation_count,
            blink_count,
            mean_pupil_dilation_pct,
            aoi_distribution: aoi_distribution(&valid),
            attention_label: Some(attention),
            pattern_label: Some(pattern),
            summary,
            stats,
            narrative_template,
            error: None,
        }
    }
}

fn degraded(
    session_id: &str,
    status: ReportStatus,
    frame_count: usize,
    valid_frame_count: usize,
    summary: &str,
    narrative: &str,
    error: &str,
) -> SessionReport {
    let success_rate_pct = if frame_count > 0 {
        valid_frame_count as f64 / frame_count as f64 * 100.0
    } else {
        0.0
    };
    SessionReport {
        session_id: session_id.to_string(),
        status,
        frame_count,
        valid_frame_count,
        success_rate_pct,
        avg_eye_count: None,
        gaze_centroid: None,
        gaze_range: None,
        gaze_stability: None,
        fixation_count: 0,
        blink_count: 0,
        mean_pupil_dilation_pct: None,
        aoi_distribution: Vec::new(),
        attention_label: None,
        pattern_label: None,
        summary: summary.to_string(),
        stats: "No statistics available".to_string(),
        narrative_template: narrative.to_string(),
        error: Some(error.to_string()),
    }
}

fn aoi_distribution(valid: &[&FrameRecord]) -> Vec<AoiShare> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for frame in valid {
        for zone in &frame.aoi {
            *counts.entry(zone.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(zone, frames)| AoiShare {
            zone: zone.to_string(),
            frames,
            share: frames as f64 / valid.len() as f64,
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn axis_range(values: &[f64]) -> AxisRange {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    AxisRange { min, max }
}
