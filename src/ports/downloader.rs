use crate::domain::StreamSelection;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A media file produced by the download engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size: u64,
}

impl DownloadedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download engine failed: {0}")]
    Engine(String),
    #[error("download produced no output file")]
    MissingOutput,
    #[error("download io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("file is too small to be media ({0} bytes)")]
    TooSmall(u64),
    #[error("no audio or video track found")]
    NoMediaTracks,
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("integrity io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The media download/mux engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        video_id: &str,
        selection: &StreamSelection,
        work_dir: &Path,
    ) -> Result<DownloadedFile, DownloadError>;
}

/// Post-download verification collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntegrityChecker: Send + Sync {
    async fn verify(&self, path: &Path) -> Result<(), IntegrityError>;
}
