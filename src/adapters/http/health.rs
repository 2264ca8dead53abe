//! Worker liveness and readiness probes.

use crate::ports::store::StateStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn StateStore>,
    /// Cancelled once the worker starts draining
    draining: CancellationToken,
    /// Cancelled once the claim loop has exited
    stopped: CancellationToken,
}

impl HealthState {
    pub fn new(
        store: Arc<dyn StateStore>,
        draining: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            store,
            draining,
            stopped,
        }
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.stopped.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "stopped")
    } else {
        (StatusCode::OK, "ok")
    }
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.draining.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "draining");
    }
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}
