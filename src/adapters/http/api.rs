//! Scheduler trigger endpoints.

use crate::application::{Repository, SyncError, SyncService};
use crate::domain::SyncJob;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::error;

#[derive(Debug, Clone)]
pub struct ApiState {
    pub sync: SyncService,
    pub repo: Repository,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    error!(error = %err, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/channels/:channel_id/sync", post(start_sync))
        .route("/api/sync-jobs/:job_id", get(sync_job))
        .route("/api/queue", get(queue))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn start_sync(
    State(state): State<ApiState>,
    Path(channel_id): Path<String>,
) -> ApiResult<(StatusCode, Json<SyncJob>)> {
    match state.sync.start_sync(&channel_id).await {
        Ok(job) => Ok((StatusCode::ACCEPTED, Json(job))),
        Err(e @ SyncError::ChannelNotFound(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err(internal(e)),
    }
}

async fn sync_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SyncJob>> {
    state
        .repo
        .sync_job(&job_id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("sync job {job_id} not found")))
}

async fn queue(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let length = state.repo.queue_len().await.map_err(internal)?;
    Ok(Json(json!({ "length": length })))
}
