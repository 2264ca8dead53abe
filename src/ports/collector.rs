use crate::domain::Video;
use crate::ports::downloader::DownloadedFile;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// The `metadata` form field sent alongside the video file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadMetadata {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub duration: Option<u64>,
    pub upload_date: Option<String>,
    pub episode_number: u32,
    pub filename: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub metadata: UploadMetadata,
}

impl UploadRequest {
    pub fn for_video(video: &Video, file: &DownloadedFile) -> Self {
        Self {
            file_path: file.path.clone(),
            metadata: UploadMetadata {
                video_id: video.id.clone(),
                channel_id: video.channel_id.clone(),
                title: video.title.clone(),
                description: video.description.clone(),
                duration: video.duration,
                upload_date: video.upload_date.clone(),
                episode_number: video.episode_number,
                filename: file.file_name(),
                file_size: file.size,
            },
        }
    }
}

/// Any collector failure is retryable.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("collector transport error: {0}")]
    Transport(String),
    #[error("could not read upload file: {0}")]
    Io(#[from] std::io::Error),
}

/// Long-term storage that receives finished downloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<(), CollectorError>;
}
