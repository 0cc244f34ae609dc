//! Session-owning service that runs each frame through the pipeline and keeps
//! per-session detector state between requests.
//!
//! Frames for one session are processed strictly one at a time. Detector state
//! lives in memory and is rebuilt from the stored log when a session is first
//! touched after a restart or after its entry was pruned.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::constants::{EYE_VISIBLE_EAR_MIN, FALLBACK_GAZE, MAX_CACHED_SESSIONS};
use crate::gaze::aoi::classify;
use crate::gaze::blink::BlinkDetector;
use crate::gaze::calibration::Calibrator;
use crate::gaze::config::GazeConfig;
use crate::gaze::ear::LandmarkFeatureExtractor;
use crate::gaze::fixation::FixationTracker;
use crate::gaze::report::SessionReportAggregator;
use crate::gaze::types::{
    CalibrationProfile, EyeFeatures, FrameFeatures, FrameInput, FrameRecord, LandmarkPayload,
    Point, SessionReport,
};
use crate::gaze::GazeError;
use crate::store::{keys, SessionMeta, SessionStore, StoreError};

/// Result of one `process_frame` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOutcome {
    pub record: FrameRecord,
    /// Set only on the frame that closed the calibration window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct SessionRuntime {
    calibrator: Calibrator,
    profile: Option<CalibrationProfile>,
    blink: BlinkDetector,
    fixation: FixationTracker,
}

impl SessionRuntime {
    fn fresh(config: &GazeConfig) -> Self {
        let mut runtime = Self {
            calibrator: Calibrator::new(config),
            profile: None,
            blink: BlinkDetector::new(
                config.default_ear_threshold,
                config.blink_min_frames,
                config.fps,
            ),
            fixation: FixationTracker::new(config.fixation_threshold),
        };
        if config.calibration_frames == 0 {
            runtime.adopt_profile(config, CalibrationProfile::fallback(config.default_ear_threshold));
        }
        runtime
    }

    fn restore(config: &GazeConfig, meta: &SessionMeta, records: &[FrameRecord]) -> Self {
        let mut runtime = Self::fresh(config);

        if let Some(profile) = meta.calibration {
            runtime.adopt_profile(config, profile);
        } else if runtime.is_calibrating() {
            runtime.calibrator = Calibrator::resume(
                config,
                records
                    .iter()
                    .filter(|r| r.calibrating)
                    .map(|r| (r.ear_value, r.iris_radius)),
            );
            if runtime.calibrator.is_window_closed() {
                let profile = runtime.calibrator.finish();
                tracing::warn!(
                    session = %meta.session_id,
                    ear_threshold = profile.ear_threshold,
                    "Calibration window closed without a stored profile, rebuilt from log"
                );
                runtime.adopt_profile(config, profile);
            }
        }

        if runtime.profile.is_some() {
            let live: Vec<&FrameRecord> = records.iter().filter(|r| !r.calibrating).collect();
            let blinks = live.iter().filter(|r| r.blink_event).count() as u32;
            runtime.blink = BlinkDetector::resume(
                runtime.blink.ear_threshold(),
                config.blink_min_frames,
                config.fps,
                blinks,
                live.len() as u64,
            );
        }

        if let Some(last) = records.last() {
            if let (true, Some(gaze)) = (last.is_valid(), last.gaze()) {
                let held_ms = (last.fixation_duration * 1000.0).round() as i64;
                runtime.fixation = FixationTracker::resume(
                    config.fixation_threshold,
                    gaze,
                    last.timestamp - Duration::milliseconds(held_ms),
                );
            }
        }

        runtime
    }

    fn adopt_profile(&mut self, config: &GazeConfig, profile: CalibrationProfile) {
        self.profile = Some(profile);
        self.blink = BlinkDetector::new(profile.ear_threshold, config.blink_min_frames, config.fps);
    }

    fn is_calibrating(&self) -> bool {
        self.profile.is_none()
    }
}

pub struct GazeEngine {
    config: GazeConfig,
    extractor: LandmarkFeatureExtractor,
    aggregator: SessionReportAggregator,
    store: Arc<SessionStore>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Option<SessionRuntime>>>>>,
}

impl GazeEngine {
    pub fn new(config: GazeConfig, store: Arc<SessionStore>) -> Result<Self, GazeError> {
        config.validate().map_err(GazeError::InvalidConfig)?;
        Ok(Self {
            extractor: LandmarkFeatureExtractor::default(),
            aggregator: SessionReportAggregator::new(&config),
            config,
            store,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    async fn session_slot(&self, key: &str) -> Arc<Mutex<Option<SessionRuntime>>> {
        let mut sessions = self.sessions.lock().await;

        // Idle entries are only referenced by the map and can be rebuilt from the store.
        if sessions.len() > MAX_CACHED_SESSIONS {
            sessions.retain(|_, v| Arc::strong_count(v) > 1);
        }

        sessions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn load_runtime(&self, session_id: &str) -> Result<SessionRuntime, StoreError> {
        match self.store.meta(session_id).await? {
            Some(meta) => {
                let records = self.store.load(session_id).await?;
                tracing::debug!(
                    session_id,
                    frames = records.len(),
                    calibrated = meta.calibration.is_some(),
                    "Restored session state from store"
                );
                Ok(SessionRuntime::restore(&self.config, &meta, &records))
            }
            None => Ok(SessionRuntime::fresh(&self.config)),
        }
    }

    /// Runs one frame through extraction, calibration, blink, fixation and AOI
    /// classification, then appends the resulting record to the session log.
    ///
    /// Malformed input never fails the call: it yields a fallback record with
    /// `error` set. Only storage failures are returned, and in that case the
    /// session's detector state is left as it was before the call.
    pub async fn process_frame(
        &self,
        session_id: &str,
        input: FrameInput,
    ) -> Result<FrameOutcome, StoreError> {
        let key = keys::session_key(session_id)?;
        let slot = self.session_slot(&key).await;
        let mut guard = slot.lock().await;

        let current = match guard.take() {
            Some(runtime) => runtime,
            None => self.load_runtime(session_id).await?,
        };
        let mut next = current.clone();

        let timestamp = input
            .captured_at_ms
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let (record, calibration, error) = self.run_pipeline(&mut next, &input, timestamp);

        if let Err(e) = self
            .store
            .append_with_calibration(session_id, &record, calibration.as_ref())
            .await
        {
            *guard = Some(current);
            return Err(e);
        }
        *guard = Some(next);

        tracing::debug!(
            session_id,
            eye_count = record.eye_count,
            calibrating = record.calibrating,
            blink = record.blink_event,
            "Frame processed"
        );

        Ok(FrameOutcome {
            record,
            calibration,
            error,
        })
    }

    fn run_pipeline(
        &self,
        runtime: &mut SessionRuntime,
        input: &FrameInput,
        timestamp: DateTime<Utc>,
    ) -> (FrameRecord, Option<CalibrationProfile>, Option<String>) {
        let features = match &input.landmarks {
            None => None,
            Some(LandmarkPayload::Undecodable(_)) => {
                return self.malformed_frame(
                    runtime,
                    timestamp,
                    GazeError::InvalidFrame("landmark payload could not be decoded".to_string()),
                );
            }
            Some(LandmarkPayload::Decoded(landmarks)) => {
                match self.extractor.extract(landmarks, input.width, input.height) {
                    Ok(features) => Some(features),
                    Err(e) => return self.malformed_frame(runtime, timestamp, e),
                }
            }
        };

        let mut record = FrameRecord::empty(timestamp);
        record.calibrating = runtime.is_calibrating();

        let mut calibration = None;
        if runtime.is_calibrating() {
            if let Some(profile) = runtime.calibrator.observe(features.as_ref()) {
                if profile.is_fallback() {
                    tracing::warn!(
                        window = runtime.calibrator.window(),
                        default_threshold = profile.ear_threshold,
                        "Calibration collected no usable frames, falling back to default EAR threshold"
                    );
                } else {
                    tracing::info!(
                        ear_threshold = profile.ear_threshold,
                        baseline_pupil_radius = profile.baseline_pupil_radius,
                        samples = profile.sample_count,
                        "Calibration complete"
                    );
                }
                runtime.adopt_profile(&self.config, profile);
                calibration = Some(profile);
            }
        } else {
            let blink = runtime.blink.update(features.as_ref().map(FrameFeatures::avg_ear));
            record.blink_event = blink.blink_detected;
            record.blink_rate_per_minute = blink.blink_rate_per_minute;
        }

        let Some(features) = features else {
            runtime.fixation.interrupt();
            return (record, calibration, None);
        };

        record.ear_value = Some(features.avg_ear());
        record.iris_radius = Some(features.avg_iris_radius());

        let visible: Vec<&EyeFeatures> = [&features.left, &features.right]
            .into_iter()
            .filter(|eye| eye.ear > EYE_VISIBLE_EAR_MIN)
            .collect();
        record.eye_count = visible.len() as u8;

        if visible.is_empty() {
            runtime.fixation.interrupt();
            return (record, calibration, None);
        }

        let n = visible.len() as f64;
        let gaze = Point::new(
            (visible.iter().map(|e| e.iris_center.x).sum::<f64>() / n / features.frame_width)
                .clamp(0.0, 1.0),
            (visible.iter().map(|e| e.iris_center.y).sum::<f64>() / n / features.frame_height)
                .clamp(0.0, 1.0),
        );
        record.gaze_x = Some(gaze.x);
        record.gaze_y = Some(gaze.y);
        record.aoi = classify(&gaze, &self.config.aoi_zones);
        record.fixation_duration = runtime.fixation.update(gaze, timestamp);

        if let Some(profile) = runtime.profile.filter(|p| p.calibrated) {
            let radius = visible.iter().map(|e| e.iris_radius).sum::<f64>() / n;
            record.pupil_dilation_pct = pupil_dilation_pct(radius, profile.baseline_pupil_radius);
        }

        (record, calibration, None)
    }

    fn malformed_frame(
        &self,
        runtime: &mut SessionRuntime,
        timestamp: DateTime<Utc>,
        error: GazeError,
    ) -> (FrameRecord, Option<CalibrationProfile>, Option<String>) {
        tracing::warn!(error = %error, "Malformed frame, recording fallback");

        let mut record = FrameRecord::empty(timestamp);
        record.calibrating = runtime.is_calibrating();
        record.gaze_x = Some(FALLBACK_GAZE);
        record.gaze_y = Some(FALLBACK_GAZE);
        record.error = Some(error.to_string());

        let mut calibration = None;
        if runtime.is_calibrating() {
            if let Some(profile) = runtime.calibrator.observe(None) {
                runtime.adopt_profile(&self.config, profile);
                calibration = Some(profile);
            }
        } else {
            let blink = runtime.blink.update(None);
            record.blink_rate_per_minute = blink.blink_rate_per_minute;
        }
        runtime.fixation.interrupt();

        let message = record.error.clone();
        (record, calibration, message)
    }

    /// Aggregates an explicit frame list when one is given (and non-empty),
    /// otherwise the stored log.
    pub async fn generate_report(
        &self,
        session_id: &str,
        frames: Option<Vec<FrameRecord>>,
    ) -> Result<SessionReport, StoreError> {
        keys::session_key(session_id)?;
        let frames = match frames {
            Some(frames) if !frames.is_empty() => frames,
            _ => self.store.load(session_id).await?,
        };
        let report = self.aggregator.aggregate(session_id, &frames);
        tracing::info!(
            session_id,
            frames = report.frame_count,
            valid = report.valid_frame_count,
            status = ?report.status,
            "Session report generated"
        );
        Ok(report)
    }

    pub async fn session_frames(&self, session_id: &str) -> Result<Vec<FrameRecord>, StoreError> {
        self.store.load(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionMeta>, StoreError> {
        let mut metas = self.store.list_meta().await?;
        metas.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(metas)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let key = keys::session_key(session_id)?;
        let slot = self.session_slot(&key).await;
        let mut guard = slot.lock().await;

        let existed = self.store.delete(session_id).await?;
        *guard = None;
        drop(guard);
        self.sessions.lock().await.remove(&key);

        if existed {
            tracing::info!(session_id, "Session deleted");
        }
        Ok(existed)
    }

    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        self.sessions.lock().await.clear();
        let removed = self.store.clear_all().await?;
        tracing::info!(removed, "All sessions cleared");
        Ok(removed)
    }

    /// Deletes sessions whose last write is older than `ttl`. Staleness is
    /// checked again under the session lock, so a frame that lands between the
    /// listing and the delete keeps the session alive.
    pub async fn sweep_expired(&self, ttl: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - ttl;
        let mut removed = 0;
        for meta in self.store.list_meta().await? {
            if meta.updated_at >= cutoff {
                continue;
            }
            let key = keys::session_key(&meta.session_id)?;
            let slot = self.session_slot(&key).await;
            let mut guard = slot.lock().await;

            let deleted = self
                .store
                .delete_if(&meta.session_id, |current| current.updated_at < cutoff)
                .await?;
            if deleted {
                *guard = None;
                drop(guard);
                self.sessions.lock().await.remove(&key);
                tracing::info!(session_id = %meta.session_id, "Expired session deleted");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Percent change of the iris radius against the calibrated baseline.
pub fn pupil_dilation_pct(radius: f64, baseline: f64) -> Option<f64> {
    (baseline > 0.0 && radius.is_finite()).then(|| (radius - baseline) / baseline * 100.0)
}
