use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::gaze::types::{FrameInput, FrameRecord};
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::SessionMeta;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).delete(clear_sessions))
        .route("/:id", axum::routing::delete(delete_session))
        .route("/:id/frames", get(list_frames).post(process_frame))
        .route("/:id/report", get(stored_report).post(generate_report))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReportRequest {
    #[serde(default)]
    frames: Option<Vec<FrameRecord>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    session_id: String,
    frame_count: u64,
    calibrated: Option<bool>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<SessionMeta> for SessionSummary {
    fn from(meta: SessionMeta) -> Self {
        Self {
            session_id: meta.session_id,
            frame_count: meta.frame_count,
            calibrated: meta.calibration.map(|c| c.calibrated),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        }
    }
}

async fn process_frame(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(input): JsonBody<FrameInput>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.engine().process_frame(&session_id, input).await?;
    Ok(ok(outcome))
}

async fn list_frames(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let frames = state.engine().session_frames(&session_id).await?;
    Ok(ok(frames))
}

async fn generate_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(req): JsonBody<ReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .engine()
        .generate_report(&session_id, req.frames)
        .await?;
    Ok(ok(report))
}

async fn stored_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.engine().generate_report(&session_id, None).await?;
    Ok(ok(report))
}

async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let sessions: Vec<SessionSummary> = state
        .engine()
        .list_sessions()
        .await?
        .into_iter()
        .map(SessionSummary::from)
        .collect();
    Ok(ok(sessions))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.engine().delete_session(&session_id).await? {
        return Err(AppError::not_found(&format!("session not found: {session_id}")));
    }
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn clear_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let removed = state.engine().clear_all().await?;
    Ok(ok(serde_json::json!({ "removed": removed })))
}
