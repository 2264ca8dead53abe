use crate::domain::{SourceVideo, StreamDescriptor};
use async_trait::async_trait;

/// One page of a channel listing, newest videos first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub videos: Vec<SourceVideo>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("video source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed video source response: {0}")]
    Malformed(String),
    #[error("video source io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The external video platform client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// List one page of a channel's videos. `None` requests the first page.
    async fn list_page(
        &self,
        source_id: &str,
        page_token: Option<String>,
    ) -> Result<SourcePage, SourceError>;

    /// Resolve the playable streams of one video.
    async fn resolve_streams(&self, video_id: &str) -> Result<Vec<StreamDescriptor>, SourceError>;
}
