use serde::{Deserialize, Serialize};

use crate::config::GazeEnvConfig;
use crate::constants::{
    DEFAULT_AOI_ZONES, DEFAULT_BLINK_MIN_FRAMES, DEFAULT_CALIBRATION_FRAMES,
    DEFAULT_EAR_MULTIPLIER, DEFAULT_EAR_THRESHOLD, DEFAULT_FIXATION_MIN_FRAMES,
    DEFAULT_FIXATION_THRESHOLD, DEFAULT_FPS,
};
use crate::gaze::aoi::{parse_zones, AoiZone};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeConfig {
    pub aoi_zones: Vec<AoiZone>,
    /// Calibration openness factor `k` in `ear_threshold = mean(ear) * k`.
    pub ear_multiplier: f64,
    /// Threshold used when calibration collected no usable frames.
    pub default_ear_threshold: f64,
    /// Normalized movement below which consecutive gaze points belong to one fixation.
    pub fixation_threshold: f64,
    pub blink_min_frames: u32,
    pub fixation_min_frames: u32,
    pub calibration_frames: u32,
    pub fps: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            aoi_zones: parse_zones(DEFAULT_AOI_ZONES).unwrap_or_default(),
            ear_multiplier: DEFAULT_EAR_MULTIPLIER,
            default_ear_threshold: DEFAULT_EAR_THRESHOLD,
            fixation_threshold: DEFAULT_FIXATION_THRESHOLD,
            blink_min_frames: DEFAULT_BLINK_MIN_FRAMES,
            fixation_min_frames: DEFAULT_FIXATION_MIN_FRAMES,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
            fps: DEFAULT_FPS,
        }
    }
}

impl GazeConfig {
    /// Builds the pipeline config from the environment section. Each invalid field
    /// is logged and replaced by its default rather than rejecting the whole config.
    pub fn from_env(env: &GazeEnvConfig) -> Self {
        let defaults = Self::default();

        let aoi_zones = match parse_zones(&env.aoi_zones) {
            Ok(zones) => zones,
            Err(e) => {
                tracing::warn!(value = %env.aoi_zones, error = %e, "Invalid AOI zones, using defaults");
                defaults.aoi_zones.clone()
            }
        };

        let candidate = Self {
            aoi_zones,
            ear_multiplier: positive_or(env.ear_multiplier, defaults.ear_multiplier, "ear_multiplier"),
            default_ear_threshold: positive_or(
                env.default_ear_threshold,
                defaults.default_ear_threshold,
                "default_ear_threshold",
            ),
            fixation_threshold: positive_or(
                env.fixation_threshold,
                defaults.fixation_threshold,
                "fixation_threshold",
            ),
            blink_min_frames: env.blink_min_frames.max(1),
            fixation_min_frames: env.fixation_min_frames.max(1),
            calibration_frames: env.calibration_frames,
            fps: positive_or(env.fps, defaults.fps, "fps"),
        };

        match candidate.validate() {
            Ok(()) => candidate,
            Err(e) => {
                tracing::warn!(error = %e, "Gaze config failed validation, using defaults");
                defaults
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("ear_multiplier", self.ear_multiplier),
            ("default_ear_threshold", self.default_ear_threshold),
            ("fixation_threshold", self.fixation_threshold),
            ("fps", self.fps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive finite number, got {value}"));
            }
        }
        if self.blink_min_frames == 0 || self.fixation_min_frames == 0 {
            return Err("minimum frame runs must be at least 1".to_string());
        }
        for zone in &self.aoi_zones {
            zone.validate()?;
        }
        Ok(())
    }
}

fn positive_or(value: f64, default: f64, field: &str) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::warn!(field, value, "Non-positive gaze parameter, using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_section() -> GazeEnvConfig {
        GazeEnvConfig {
            aoi_zones: DEFAULT_AOI_ZONES.to_string(),
            ear_multiplier: 0.7,
            default_ear_threshold: 0.25,
            fixation_threshold: 0.05,
            blink_min_frames: 2,
            fixation_min_frames: 2,
            calibration_frames: 30,
            fps: 30.0,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = GazeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.aoi_zones.len(), 3);
    }

    #[test]
    fn bad_zone_string_falls_back_to_default_zones() {
        let mut env = env_section();
        env.aoi_zones = "left:0,0,nope".to_string();
        let cfg = GazeConfig::from_env(&env);
        assert_eq!(cfg.aoi_zones, GazeConfig::default().aoi_zones);
    }

    #[test]
    fn negative_threshold_is_replaced() {
        let mut env = env_section();
        env.fixation_threshold = -1.0;
        env.blink_min_frames = 0;
        let cfg = GazeConfig::from_env(&env);
        assert_eq!(cfg.fixation_threshold, DEFAULT_FIXATION_THRESHOLD);
        assert_eq!(cfg.blink_min_frames, 1);
    }
}
