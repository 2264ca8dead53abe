use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-video download state.
///
/// `downloaded` and `failed` are accepted as older spellings of
/// `completed` and `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Queued,
    Downloading,
    #[serde(alias = "downloaded")]
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl VideoStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Error)
    }

    /// Whether a rediscovered video should be pushed onto the queue again.
    pub fn is_requeue_eligible(self) -> bool {
        matches!(self, VideoStatus::Pending | VideoStatus::Error)
    }
}

/// Video metadata as listed by the external source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceVideo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Seconds
    pub duration: Option<u64>,
    /// `YYYYMMDD` as reported by the source
    pub upload_date: Option<String>,
    pub thumbnail: Option<String>,
    pub view_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Assigned once at discovery, never renumbered
    #[serde(default)]
    pub episode_number: u32,
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// A freshly discovered video, waiting for a worker.
    pub fn discovered(channel_id: &str, meta: &SourceVideo, episode_number: u32) -> Self {
        let now = Utc::now();
        Self {
            id: meta.id.clone(),
            channel_id: channel_id.to_string(),
            title: meta.title.clone(),
            description: meta.description.clone(),
            duration: meta.duration,
            upload_date: meta.upload_date.clone(),
            thumbnail: meta.thumbnail.clone(),
            view_count: meta.view_count,
            episode_number,
            status: VideoStatus::Pending,
            file_path: None,
            file_size: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stand-in used by workers when the claimed video has no stored record.
    pub fn placeholder(channel_id: &str, video_id: &str) -> Self {
        Self::discovered(
            channel_id,
            &SourceVideo {
                id: video_id.to_string(),
                ..SourceVideo::default()
            },
            0,
        )
    }

    /// Put a previously failed video back to `pending` ahead of a requeue.
    /// The episode number is left untouched.
    pub fn reset_for_requeue(&mut self) {
        self.status = VideoStatus::Pending;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if update.file_path.is_some() {
            self.file_path = update.file_path.clone();
        }
        if update.file_size.is_some() {
            self.file_size = update.file_size;
        }
        self.error_message = update.error.clone();
        self.updated_at = Utc::now();
    }
}

/// A status transition reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn downloading() -> Self {
        Self {
            status: VideoStatus::Downloading,
            file_path: None,
            file_size: None,
            error: None,
        }
    }

    pub fn completed(file_path: impl Into<String>, file_size: u64) -> Self {
        Self {
            status: VideoStatus::Completed,
            file_path: Some(file_path.into()),
            file_size: Some(file_size),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: VideoStatus::Error,
            file_path: None,
            file_size: None,
            error: Some(error.into()),
        }
    }
}
