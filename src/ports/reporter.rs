use crate::domain::{QueueItem, StatusUpdate};
use crate::ports::store::StoreError;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("controller rejected status report: {0}")]
    Controller(String),
}

/// Where workers write back per-video outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, item: &QueueItem, update: &StatusUpdate) -> Result<(), ReportError>;
}
