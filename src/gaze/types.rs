use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 2-D point. Landmarks arrive normalized to `[0,1]`; extracted geometry is in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scaled(&self, width: f64, height: f64) -> Point {
        Point::new(self.x * width, self.y * height)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One frame's face-mesh landmarks as produced by the external detector,
/// indexed by mesh position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    pub points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }
}

/// Geometry measured for a single eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeFeatures {
    pub ear: f64,
    /// Iris center in pixel space.
    pub iris_center: Point,
    /// Mean pixel distance from the iris center to the four boundary landmarks.
    pub iris_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameFeatures {
    pub left: EyeFeatures,
    pub right: EyeFeatures,
    pub frame_width: f64,
    pub frame_height: f64,
}

impl FrameFeatures {
    pub fn avg_ear(&self) -> f64 {
        (self.left.ear + self.right.ear) / 2.0
    }

    pub fn avg_iris_radius(&self) -> f64 {
        (self.left.iris_radius + self.right.iris_radius) / 2.0
    }
}

/// Per-session calibration result. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub ear_threshold: f64,
    pub baseline_pupil_radius: f64,
    pub calibrated: bool,
    /// Number of calibration frames that produced usable landmarks.
    pub sample_count: u32,
}

impl CalibrationProfile {
    /// Profile used when the baseline window produced nothing usable.
    pub fn fallback(default_ear_threshold: f64) -> Self {
        Self {
            ear_threshold: default_ear_threshold,
            baseline_pupil_radius: 0.0,
            calibrated: false,
            sample_count: 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !self.calibrated
    }
}

/// One processed frame. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    pub timestamp: DateTime<Utc>,
    pub gaze_x: Option<f64>,
    pub gaze_y: Option<f64>,
    pub ear_value: Option<f64>,
    pub eye_count: u8,
    #[serde(default)]
    pub aoi: BTreeSet<String>,
    #[serde(default)]
    pub fixation_duration: f64,
    #[serde(default)]
    pub pupil_dilation_pct: Option<f64>,
    /// Mean iris radius in pixels of the measured eyes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iris_radius: Option<f64>,
    #[serde(default)]
    pub blink_event: bool,
    #[serde(default)]
    pub blink_rate_per_minute: f64,
    #[serde(default)]
    pub calibrating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameRecord {
    /// Record for a frame in which no eye could be measured. Geometry stays empty.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            gaze_x: None,
            gaze_y: None,
            ear_value: None,
            eye_count: 0,
            aoi: BTreeSet::new(),
            fixation_duration: 0.0,
            pupil_dilation_pct: None,
            iris_radius: None,
            blink_event: false,
            blink_rate_per_minute: 0.0,
            calibrating: false,
            error: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.eye_count > 0
    }

    pub fn gaze(&self) -> Option<Point> {
        match (self.gaze_x, self.gaze_y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }
}

/// Landmark field of a frame as received. A payload that does not decode into
/// points is kept raw so the frame can still be recorded with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LandmarkPayload {
    Decoded(LandmarkSet),
    Undecodable(serde_json::Value),
}

impl From<LandmarkSet> for LandmarkPayload {
    fn from(set: LandmarkSet) -> Self {
        Self::Decoded(set)
    }
}

/// Input for one frame: detector output plus the frame's pixel dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInput {
    pub width: f64,
    pub height: f64,
    /// `None` means the detector found no face in the frame.
    #[serde(default)]
    pub landmarks: Option<LandmarkPayload>,
    #[serde(default)]
    pub captured_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionLabel {
    #[serde(rename = "highly focused")]
    HighlyFocused,
    #[serde(rename = "normal engagement")]
    NormalEngagement,
    #[serde(rename = "active exploration")]
    ActiveExploration,
}

impl AttentionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighlyFocused => "highly focused",
            Self::NormalEngagement => "normal engagement",
            Self::ActiveExploration => "active exploration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternLabel {
    #[serde(rename = "concentrated focus")]
    ConcentratedFocus,
    #[serde(rename = "balanced attention")]
    BalancedAttention,
    #[serde(rename = "broad scanning")]
    BroadScanning,
}

impl PatternLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConcentratedFocus => "concentrated focus",
            Self::BalancedAttention => "balanced attention",
            Self::BroadScanning => "broad scanning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    NoData,
    NoUsableData,
    NoGazePoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeRange {
    pub x: AxisRange,
    pub y: AxisRange,
}

impl GazeRange {
    pub fn max_span(&self) -> f64 {
        self.x.span().max(self.y.span())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AoiShare {
    pub zone: String,
    pub frames: usize,
    pub share: f64,
}

/// Derived, read-only session summary. Recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub status: ReportStatus,
    pub frame_count: usize,
    pub valid_frame_count: usize,
    pub success_rate_pct: f64,
    pub avg_eye_count: Option<f64>,
    pub gaze_centroid: Option<Point>,
    pub gaze_range: Option<GazeRange>,
    pub gaze_stability: Option<f64>,
    pub fixation_count: usize,
    pub blink_count: usize,
    pub mean_pupil_dilation_pct: Option<f64>,
    pub aoi_distribution: Vec<AoiShare>,
    pub attention_label: Option<AttentionLabel>,
    pub pattern_label: Option<PatternLabel>,
    pub summary: String,
    pub stats: String,
    pub narrative_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
