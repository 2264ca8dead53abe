use super::channel::Channel;
use super::video::Video;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobStatus {
    Pending,
    Discovering,
    Running,
    Completed,
    Failed,
}

impl SyncJobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncJobStatus::Completed | SyncJobStatus::Failed)
    }

    /// Forward-only state machine:
    /// pending -> discovering -> running -> {completed | failed}.
    /// Discovery may finish the job directly, and a job that never got to
    /// discover can still fail.
    pub fn can_transition_to(self, next: SyncJobStatus) -> bool {
        use SyncJobStatus::*;
        matches!(
            (self, next),
            (Pending, Discovering)
                | (Pending, Failed)
                | (Discovering, Running)
                | (Discovering, Completed)
                | (Discovering, Failed)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal sync job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: SyncJobStatus,
    pub to: SyncJobStatus,
}

/// One discovery + download attempt for a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub channel_id: String,
    pub source_id: String,
    pub status: SyncJobStatus,
    /// Videos pushed onto the queue by this sync
    pub video_count: usize,
    pub downloaded_count: usize,
    pub failed_count: usize,
    /// Discovery fell back to already-known videos
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn new(channel: &Channel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel.id.clone(),
            source_id: channel.source_id.clone(),
            status: SyncJobStatus::Pending,
            video_count: 0,
            downloaded_count: 0,
            failed_count: 0,
            degraded: false,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, next: SyncJobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(SyncJobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn record_progress(&mut self, progress: &ChannelProgress) {
        self.downloaded_count = progress.completed;
        self.failed_count = progress.failed;
        self.updated_at = Utc::now();
    }
}

/// Per-channel tally of video states, derived from the store on every poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelProgress {
    pub total: usize,
    /// pending, queued or downloading
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ChannelProgress {
    pub fn tally<'a>(videos: impl IntoIterator<Item = &'a Video>) -> Self {
        videos
            .into_iter()
            .fold(ChannelProgress::default(), |mut acc, video| {
                acc.total += 1;
                match video.status {
                    super::video::VideoStatus::Completed => acc.completed += 1,
                    super::video::VideoStatus::Error => acc.failed += 1,
                    _ => acc.in_flight += 1,
                }
                acc
            })
    }

    /// True when no video is left in a non-terminal state, including the
    /// case where the channel has no videos at all.
    pub fn all_processed(&self) -> bool {
        self.in_flight == 0
    }

    /// A drained sync where nothing succeeded but something failed.
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.completed == 0
    }
}
