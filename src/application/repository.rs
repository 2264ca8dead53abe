//! Typed records over the shared state store.
//!
//! JSON strings are decoded exactly once here; everything above this layer
//! works with domain types.

use crate::domain::{is_valid_id, Channel, ChannelProgress, ChannelStatus, QueueItem, StatusUpdate, SyncJob, Video};
use crate::ports::store::{StateStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const NAMESPACE: &str = "tubarchive";
/// The single queue shared by every channel.
pub const QUEUE_KEY: &str = "tubarchive:queue:downloads";
const CHANNEL_INDEX_KEY: &str = "tubarchive:channels";
/// How long finished and unfinished sync job records are kept.
pub const SYNC_JOB_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn channel_key(channel_id: &str) -> String {
    format!("{}:channel:{}", NAMESPACE, channel_id)
}

fn video_prefix(channel_id: &str) -> String {
    format!("{}:video:{}:", NAMESPACE, channel_id)
}

fn video_key(channel_id: &str, video_id: &str) -> String {
    format!("{}{}", video_prefix(channel_id), video_id)
}

fn sync_job_key(job_id: &str) -> String {
    format!("{}:sync_job:{}", NAMESPACE, job_id)
}

fn check_id(id: &str) -> Result<(), StoreError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn StateStore>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, ttl).await
    }

    // Channels

    pub async fn channel(&self, channel_id: &str) -> Result<Option<Channel>, StoreError> {
        self.get_json(&channel_key(channel_id)).await
    }

    /// Write a channel record and index it.
    pub async fn save_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        check_id(&channel.id)?;
        self.put_json(&channel_key(&channel.id), channel, None).await?;
        self.store.sadd(CHANNEL_INDEX_KEY, &channel.id).await
    }

    pub async fn remove_channel_from_index(&self, channel_id: &str) -> Result<(), StoreError> {
        self.store.srem(CHANNEL_INDEX_KEY, channel_id).await
    }

    pub async fn channel_ids(&self) -> Result<Vec<String>, StoreError> {
        self.store.smembers(CHANNEL_INDEX_KEY).await
    }

    /// Read-modify-write of the channel status. Returns `None` when the
    /// channel record does not exist.
    pub async fn set_channel_status(
        &self,
        channel_id: &str,
        status: ChannelStatus,
    ) -> Result<Option<Channel>, StoreError> {
        let Some(mut channel) = self.channel(channel_id).await? else {
            warn!(channel_id, ?status, "Channel record missing, status not updated");
            return Ok(None);
        };
        channel.set_status(status);
        self.put_json(&channel_key(channel_id), &channel, None).await?;
        debug!(channel_id, ?status, "Channel status updated");
        Ok(Some(channel))
    }

    // Videos

    pub async fn video(&self, channel_id: &str, video_id: &str) -> Result<Option<Video>, StoreError> {
        self.get_json(&video_key(channel_id, video_id)).await
    }

    pub async fn save_video(&self, video: &Video) -> Result<(), StoreError> {
        check_id(&video.channel_id)?;
        check_id(&video.id)?;
        self.put_json(&video_key(&video.channel_id, &video.id), video, None)
            .await
    }

    /// Every stored video of a channel. Records that fail to decode are
    /// logged and left out.
    pub async fn channel_videos(&self, channel_id: &str) -> Result<Vec<Video>, StoreError> {
        let keys = self.store.scan_prefix(&video_prefix(channel_id)).await?;
        let mut videos = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(json) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<Video>(&json) {
                Ok(video) => videos.push(video),
                Err(e) => warn!(key = %key, error = %e, "Skipping undecodable video record"),
            }
        }
        Ok(videos)
    }

    /// Highest episode number already assigned in a channel.
    pub async fn max_episode_number(&self, channel_id: &str) -> Result<u32, StoreError> {
        Ok(self
            .channel_videos(channel_id)
            .await?
            .iter()
            .map(|video| video.episode_number)
            .max()
            .unwrap_or(0))
    }

    /// Apply a worker's status report. A report for a video without a
    /// record creates a minimal one.
    pub async fn update_video_status(
        &self,
        channel_id: &str,
        video_id: &str,
        update: &StatusUpdate,
    ) -> Result<Video, StoreError> {
        let mut video = match self.video(channel_id, video_id).await? {
            Some(video) => video,
            None => {
                warn!(channel_id, video_id, "Status report for unknown video");
                Video::placeholder(channel_id, video_id)
            }
        };
        video.apply(update);
        self.save_video(&video).await?;
        Ok(video)
    }

    pub async fn channel_progress(&self, channel_id: &str) -> Result<ChannelProgress, StoreError> {
        let videos = self.channel_videos(channel_id).await?;
        Ok(ChannelProgress::tally(&videos))
    }

    /// False iff at least one of the channel's videos is pending, queued or
    /// downloading.
    pub async fn all_processed(&self, channel_id: &str) -> Result<bool, StoreError> {
        Ok(self.channel_progress(channel_id).await?.all_processed())
    }

    // Sync jobs

    pub async fn sync_job(&self, job_id: &str) -> Result<Option<SyncJob>, StoreError> {
        self.get_json(&sync_job_key(job_id)).await
    }

    pub async fn save_sync_job(&self, job: &SyncJob) -> Result<(), StoreError> {
        self.put_json(&sync_job_key(&job.id), job, Some(SYNC_JOB_RETENTION))
            .await
    }

    // Unified queue

    pub async fn enqueue(&self, item: &QueueItem) -> Result<(), StoreError> {
        check_id(&item.channel_id)?;
        check_id(&item.video_id)?;
        self.store.lpush(QUEUE_KEY, &item.encode()).await
    }

    /// Atomically take the oldest item. The raw string is returned so that
    /// the caller decides what to do with malformed items.
    pub async fn claim(&self) -> Result<Option<String>, StoreError> {
        self.store.rpop(QUEUE_KEY).await
    }

    pub async fn queue_len(&self) -> Result<u64, StoreError> {
        self.store.llen(QUEUE_KEY).await
    }
}
