/// Default AOI layout: three vertical bands over normalized coordinates.
pub const DEFAULT_AOI_ZONES: &str = "left:0,0,0.3333,1;center:0.3333,0,0.6667,1;right:0.6667,0,1,1";

/// Calibration openness factor applied to the mean baseline EAR
pub const DEFAULT_EAR_MULTIPLIER: f64 = 0.7;

/// EAR threshold used when calibration produced no usable frames
pub const DEFAULT_EAR_THRESHOLD: f64 = 0.25;

/// Normalized gaze movement below which a frame continues a fixation
pub const DEFAULT_FIXATION_THRESHOLD: f64 = 0.05;

/// Consecutive below-threshold frames that make a blink
pub const DEFAULT_BLINK_MIN_FRAMES: u32 = 2;

/// Consecutive stable frames that make a fixation
pub const DEFAULT_FIXATION_MIN_FRAMES: u32 = 2;

/// Frames observed before a session's calibration profile is fixed
pub const DEFAULT_CALIBRATION_FRAMES: u32 = 30;

/// Nominal capture rate used to convert frame counts into time
pub const DEFAULT_FPS: f64 = 30.0;

/// An eye only counts as visible when its EAR exceeds this
pub const EYE_VISIBLE_EAR_MIN: f64 = 0.1;

/// Gaze coordinate recorded for frames that failed processing
pub const FALLBACK_GAZE: f64 = 0.5;

/// Stability below this is "highly focused"
pub const ATTENTION_HIGHLY_FOCUSED_MAX: f64 = 0.05;

/// Stability below this (and not highly focused) is "normal engagement"
pub const ATTENTION_NORMAL_ENGAGEMENT_MAX: f64 = 0.10;

/// Widest axis span below this is "concentrated focus"
pub const PATTERN_CONCENTRATED_MAX: f64 = 0.3;

/// Widest axis span below this (and not concentrated) is "balanced attention"
pub const PATTERN_BALANCED_MAX: f64 = 0.6;

/// Store write attempts before giving up
pub const DEFAULT_STORE_WRITE_RETRIES: u32 = 3;

/// Fixed pause between store write attempts (ms)
pub const DEFAULT_STORE_RETRY_BACKOFF_MS: u64 = 1000;

/// Idle sessions older than this are swept (hours, 0 disables)
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;

/// Per-session runtime entries kept before idle ones are pruned
pub const MAX_CACHED_SESSIONS: usize = 1000;

pub const SECONDS_PER_MINUTE: f64 = 60.0;
