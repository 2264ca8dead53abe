use crate::domain::{QueueItem, StatusUpdate};
use crate::ports::reporter::{ReportError, StatusReporter};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reports worker status to the controller's HTTP API instead of writing the
/// store directly.
#[derive(Debug, Clone)]
pub struct ControllerReporter {
    client: Client,
    base_url: String,
}

impl ControllerReporter {
    pub fn new(base_url: &str) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .map_err(|e| ReportError::Controller(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn status_url(&self, item: &QueueItem) -> String {
        format!(
            "{}/api/videos/{}/{}/status",
            self.base_url, item.channel_id, item.video_id
        )
    }
}

#[async_trait]
impl StatusReporter for ControllerReporter {
    async fn report(&self, item: &QueueItem, update: &StatusUpdate) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.status_url(item))
            .json(update)
            .send()
            .await
            .map_err(|e| ReportError::Controller(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ReportError::Controller(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VideoStatus;
    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, String, StatusUpdate)>>>;

    async fn record(
        State(seen): State<Seen>,
        Path((channel_id, video_id)): Path<(String, String)>,
        Json(update): Json<StatusUpdate>,
    ) -> axum::http::StatusCode {
        seen.lock().unwrap().push((channel_id, video_id, update));
        axum::http::StatusCode::NO_CONTENT
    }

    #[tokio::test]
    async fn posts_update_to_video_status_route() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/api/videos/:channel_id/:video_id/status", post(record))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let reporter = ControllerReporter::new(&format!("http://{addr}")).unwrap();
        reporter
            .report(&QueueItem::new("c1", "v1"), &StatusUpdate::failed("boom"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (channel_id, video_id, update) = &seen[0];
        assert_eq!((channel_id.as_str(), video_id.as_str()), ("c1", "v1"));
        assert_eq!(update.status, VideoStatus::Error);
        assert_eq!(update.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn unknown_route_is_controller_error() {
        let app = Router::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let err = ControllerReporter::new(&format!("http://{addr}"))
            .unwrap()
            .report(&QueueItem::new("c1", "v1"), &StatusUpdate::downloading())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Controller(msg) if msg == "HTTP 404"));
    }
}
