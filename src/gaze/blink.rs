//! Blink detection.
//!
//! Two-state run-length machine: `Open` and `Closing` (accumulating low-EAR
//! frames). A blink fires when the eye reopens after at least `min_frames`
//! consecutive low frames, so a single noisy low frame never counts.

use crate::constants::SECONDS_PER_MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EyeState {
    Open,
    Closing { low_frames: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkUpdate {
    pub blink_detected: bool,
    pub blink_count: u32,
    pub blink_rate_per_minute: f64,
}

#[derive(Debug, Clone)]
pub struct BlinkDetector {
    ear_threshold: f64,
    min_frames: u32,
    fps: f64,
    state: EyeState,
    blink_count: u32,
    total_frames_seen: u64,
}

impl BlinkDetector {
    pub fn new(ear_threshold: f64, min_frames: u32, fps: f64) -> Self {
        Self {
            ear_threshold,
            min_frames: min_frames.max(1),
            fps,
            state: EyeState::Open,
            blink_count: 0,
            total_frames_seen: 0,
        }
    }

    /// Rebuilds a detector from counts recovered out of a persisted frame log.
    /// The eye is assumed open.
    pub fn resume(
        ear_threshold: f64,
        min_frames: u32,
        fps: f64,
        blink_count: u32,
        total_frames_seen: u64,
    ) -> Self {
        Self {
            blink_count,
            total_frames_seen,
            ..Self::new(ear_threshold, min_frames, fps)
        }
    }

    /// Feeds one frame. `None` (no landmarks) counts toward elapsed frames but
    /// leaves the open/closing state untouched.
    pub fn update(&mut self, avg_ear: Option<f64>) -> BlinkUpdate {
        self.total_frames_seen += 1;
        let mut blink_detected = false;

        if let Some(ear) = avg_ear {
            self.state = match self.state {
                EyeState::Open if ear < self.ear_threshold => EyeState::Closing { low_frames: 1 },
                EyeState::Open => EyeState::Open,
                EyeState::Closing { low_frames } if ear < self.ear_threshold => {
                    EyeState::Closing {
                        low_frames: low_frames + 1,
                    }
                }
                EyeState::Closing { low_frames } => {
                    if low_frames >= self.min_frames {
                        self.blink_count += 1;
                        blink_detected = true;
                    }
                    EyeState::Open
                }
            };
        }

        BlinkUpdate {
            blink_detected,
            blink_count: self.blink_count,
            blink_rate_per_minute: self.blink_rate_per_minute(),
        }
    }

    pub fn ear_threshold(&self) -> f64 {
        self.ear_threshold
    }

    pub fn blink_count(&self) -> u32 {
        self.blink_count
    }

    pub fn consecutive_low_frames(&self) -> u32 {
        match self.state {
            EyeState::Open => 0,
            EyeState::Closing { low_frames } => low_frames,
        }
    }

    pub fn total_frames_seen(&self) -> u64 {
        self.total_frames_seen
    }

    /// `blink_count / (frames / fps) * 60`; zero before any frame was seen.
    pub fn blink_rate_per_minute(&self) -> f64 {
        if self.total_frames_seen == 0 || self.fps <= 0.0 {
            return 0.0;
        }
        let elapsed_secs = self.total_frames_seen as f64 / self.fps;
        self.blink_count as f64 / elapsed_secs * SECONDS_PER_MINUTE
    }
}
