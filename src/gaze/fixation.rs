//! Fixation tracking.
//!
//! A frame is "stable" when its gaze point moved less than the threshold since the
//! previous frame. Live tracking reports how long the current stable stretch has
//! lasted; session counting requires `min_frames` consecutive stable frames
//! before a stretch counts as one fixation.

use chrono::{DateTime, Utc};

use crate::gaze::types::Point;

#[derive(Debug, Clone)]
pub struct FixationTracker {
    threshold: f64,
    last_gaze_point: Option<Point>,
    fixation_start: Option<DateTime<Utc>>,
}

impl FixationTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_gaze_point: None,
            fixation_start: None,
        }
    }

    /// Continues a fixation that was in progress when the session state was last persisted.
    pub fn resume(threshold: f64, last_gaze_point: Point, fixation_start: DateTime<Utc>) -> Self {
        Self {
            threshold,
            last_gaze_point: Some(last_gaze_point),
            fixation_start: Some(fixation_start),
        }
    }

    /// Feeds the frame's gaze point and returns the current fixation duration in seconds.
    pub fn update(&mut self, gaze: Point, now: DateTime<Utc>) -> f64 {
        let stable = self
            .last_gaze_point
            .map(|last| gaze.distance(&last) < self.threshold)
            .unwrap_or(false);
        self.last_gaze_point = Some(gaze);

        if stable {
            let start = *self.fixation_start.get_or_insert(now);
            seconds_between(start, now)
        } else {
            self.fixation_start = Some(now);
            0.0
        }
    }

    /// A frame without a gaze point ends the current fixation.
    pub fn interrupt(&mut self) {
        self.last_gaze_point = None;
        self.fixation_start = None;
    }

    pub fn last_gaze_point(&self) -> Option<Point> {
        self.last_gaze_point
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let micros = (end - start).num_microseconds().unwrap_or(0);
    (micros.max(0) as f64) / 1_000_000.0
}

/// Counts discrete fixations in a gaze sequence: every stretch of at least
/// `min_frames` consecutive stable frames counts once.
pub fn count_fixations(points: &[Point], threshold: f64, min_frames: u32) -> usize {
    let min_frames = min_frames.max(1);
    let mut fixations = 0;
    let mut run = 0u32;

    for pair in points.windows(2) {
        if pair[1].distance(&pair[0]) < threshold {
            run += 1;
        } else {
            if run >= min_frames {
                fixations += 1;
            }
            run = 0;
        }
    }
    if run >= min_frames {
        fixations += 1;
    }
    fixations
}
