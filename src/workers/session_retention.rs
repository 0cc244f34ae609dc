use chrono::Duration;

use crate::gaze::GazeEngine;

/// A century; keeps the chrono duration in range.
const MAX_TTL_HOURS: u64 = 876_000;

/// Deletes sessions idle for longer than `ttl_hours`.
pub async fn run(engine: &GazeEngine, ttl_hours: u64) {
    tracing::debug!("session_retention: start");
    let ttl = Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64);
    match engine.sweep_expired(ttl).await {
        Ok(count) => tracing::info!(removed = count, ttl_hours, "session_retention: done"),
        Err(e) => tracing::error!(error = %e, "session_retention failed"),
    }
}
