pub mod aoi;
pub mod blink;
pub mod calibration;
pub mod config;
pub mod ear;
pub mod engine;
pub mod fixation;
pub mod report;
pub mod types;

use thiserror::Error;

pub use config::GazeConfig;
pub use engine::{FrameOutcome, GazeEngine};

/// Per-frame failures. These are recorded on the frame, never propagated out of a session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GazeError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid gaze config: {0}")]
    InvalidConfig(String),
}
