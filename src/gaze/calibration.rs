//! Per-session baseline collection.
//!
//! The first `window` frames of a session feed the calibrator. When the window
//! closes: `ear_threshold = mean(ear) * k` and `baseline_pupil_radius =
//! median(iris radius)`. A window without any usable frame produces the
//! fallback profile (`calibrated = false`, default threshold).

use crate::gaze::config::GazeConfig;
use crate::gaze::types::{CalibrationProfile, FrameFeatures};

#[derive(Debug, Clone)]
pub struct Calibrator {
    window: u32,
    ear_multiplier: f64,
    default_ear_threshold: f64,
    frames_observed: u32,
    ear_samples: Vec<f64>,
    radius_samples: Vec<f64>,
}

impl Calibrator {
    pub fn new(config: &GazeConfig) -> Self {
        Self {
            window: config.calibration_frames,
            ear_multiplier: config.ear_multiplier,
            default_ear_threshold: config.default_ear_threshold,
            frames_observed: 0,
            ear_samples: Vec::with_capacity(config.calibration_frames as usize),
            radius_samples: Vec::with_capacity(config.calibration_frames as usize),
        }
    }

    /// Rebuilds a calibrator partway through its window. Each item is the
    /// `(ear, iris_radius)` pair of one frame already recorded while calibrating;
    /// `None` stands for a frame without usable landmarks.
    pub fn resume<I>(config: &GazeConfig, frames: I) -> Self
    where
        I: IntoIterator<Item = (Option<f64>, Option<f64>)>,
    {
        let mut calibrator = Self::new(config);
        for (ear, radius) in frames {
            if calibrator.is_window_closed() {
                break;
            }
            calibrator.frames_observed += 1;
            calibrator.push_samples(ear, radius);
        }
        calibrator
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn frames_observed(&self) -> u32 {
        self.frames_observed
    }

    pub fn is_window_closed(&self) -> bool {
        self.frames_observed >= self.window
    }

    /// Feeds one frame (or a frame without landmarks). Returns the profile on the
    /// frame that closes the window.
    pub fn observe(&mut self, features: Option<&FrameFeatures>) -> Option<CalibrationProfile> {
        if self.is_window_closed() {
            return None;
        }
        self.frames_observed += 1;

        if let Some(features) = features {
            self.push_samples(Some(features.avg_ear()), Some(features.avg_iris_radius()));
        }

        self.is_window_closed().then(|| self.finish())
    }

    fn push_samples(&mut self, ear: Option<f64>, radius: Option<f64>) {
        if let Some(ear) = ear.filter(|e| e.is_finite() && *e > 0.0) {
            self.ear_samples.push(ear);
        }
        if let Some(radius) = radius.filter(|r| r.is_finite() && *r > 0.0) {
            self.radius_samples.push(radius);
        }
    }

    /// Computes the profile from whatever has been collected so far.
    pub fn finish(&self) -> CalibrationProfile {
        if self.ear_samples.is_empty() {
            return CalibrationProfile::fallback(self.default_ear_threshold);
        }

        let mean_ear = self.ear_samples.iter().sum::<f64>() / self.ear_samples.len() as f64;
        CalibrationProfile {
            ear_threshold: mean_ear * self.ear_multiplier,
            baseline_pupil_radius: median(&self.radius_samples).unwrap_or(0.0),
            calibrated: true,
            sample_count: self.ear_samples.len() as u32,
        }
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
