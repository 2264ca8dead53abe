//! Streaming multipart upload to the collector service.

use crate::ports::collector::{Collector, CollectorError, UploadRequest};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Whole-request deadline for a single upload attempt.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: Client,
    upload_url: String,
}

impl HttpCollector {
    pub fn new(base_url: &str) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| CollectorError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            upload_url: format!("{}/upload", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn upload(&self, request: &UploadRequest) -> Result<(), CollectorError> {
        let file = tokio::fs::File::open(&request.file_path).await?;
        let length = file.metadata().await?.len();
        let metadata = serde_json::to_string(&request.metadata)
            .map_err(|e| CollectorError::Transport(e.to_string()))?;

        // The file is streamed in chunks, never buffered whole.
        let body = Body::wrap_stream(ReaderStream::new(file));
        let video = Part::stream_with_length(body, length)
            .file_name(request.metadata.filename.clone())
            .mime_str("video/mp4")
            .map_err(|e| CollectorError::Transport(e.to_string()))?;
        let form = Form::new().text("metadata", metadata).part("video", video);

        debug!(
            video_id = %request.metadata.video_id,
            url = %self.upload_url,
            bytes = length,
            "Uploading to collector"
        );
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CollectorError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
