use super::repository::Repository;
use crate::domain::{QueueItem, StatusUpdate};
use crate::ports::reporter::{ReportError, StatusReporter};
use async_trait::async_trait;
use tracing::debug;

/// Writes worker status reports straight into the video records.
#[derive(Debug, Clone)]
pub struct StoreReporter {
    repo: Repository,
}

impl StoreReporter {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl StatusReporter for StoreReporter {
    async fn report(&self, item: &QueueItem, update: &StatusUpdate) -> Result<(), ReportError> {
        self.repo
            .update_video_status(&item.channel_id, &item.video_id, update)
            .await?;
        debug!(
            channel_id = %item.channel_id,
            video_id = %item.video_id,
            status = ?update.status,
            "Status written to store"
        );
        Ok(())
    }
}
