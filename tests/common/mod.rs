#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tubarchive::adapters::memory::MemoryStore;
use tubarchive::application::{DiscoveryService, ProgressMonitor, Repository, SyncService};
use tubarchive::domain::{Channel, SourceVideo, StreamDescriptor, StreamSelection, Video, VideoStatus};
use tubarchive::ports::{
    DownloadError, DownloadedFile, Downloader, IntegrityChecker, IntegrityError, SourceError,
    SourcePage, VideoSource,
};

pub fn repo() -> Repository {
    Repository::new(Arc::new(MemoryStore::new()))
}

pub fn meta(id: &str) -> SourceVideo {
    SourceVideo {
        id: id.to_string(),
        title: format!("Title {id}"),
        duration: Some(120),
        upload_date: Some("20240101".to_string()),
        ..SourceVideo::default()
    }
}

/// A paged listing. Page tokens are page indexes. `fail_from_call` makes
/// every `list_page` call from that (0-based) call onwards fail.
pub struct FakeSource {
    pages: Mutex<Vec<Vec<SourceVideo>>>,
    fail_from_call: Option<usize>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(pages: &[&[&str]]) -> Self {
        Self {
            pages: Mutex::new(
                pages
                    .iter()
                    .map(|page| page.iter().map(|id| meta(id)).collect())
                    .collect(),
            ),
            fail_from_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::new(&[]).fail_from_call(0)
    }

    pub fn fail_from_call(mut self, call: usize) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn list_page(
        &self,
        _source_id: &str,
        page_token: Option<String>,
    ) -> Result<SourcePage, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_from_call.is_some_and(|from| call >= from) {
            return Err(SourceError::Unavailable("listing quota exceeded".into()));
        }
        let index: usize = page_token.as_deref().unwrap_or("0").parse().unwrap();
        let pages = self.pages.lock().unwrap();
        let videos = pages.get(index).cloned().unwrap_or_default();
        let next_page_token = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(SourcePage {
            videos,
            next_page_token,
        })
    }

    async fn resolve_streams(&self, _video_id: &str) -> Result<Vec<StreamDescriptor>, SourceError> {
        Ok(vec![StreamDescriptor {
            format_id: "18".into(),
            mime_type: r#"video/mp4; codecs="avc1.42001E, mp4a.40.2""#.into(),
            height: Some(360),
            ..StreamDescriptor::default()
        }])
    }
}

/// Writes a fixed-size file per video.
pub struct FakeDownloader {
    pub size: usize,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        video_id: &str,
        _selection: &StreamSelection,
        work_dir: &Path,
    ) -> Result<DownloadedFile, DownloadError> {
        let path = work_dir.join(format!("{video_id}.mp4"));
        tokio::fs::write(&path, vec![7u8; self.size]).await?;
        Ok(DownloadedFile {
            path,
            size: self.size as u64,
        })
    }
}

/// Applies only the size floor.
pub struct SizeChecker;

#[async_trait]
impl IntegrityChecker for SizeChecker {
    async fn verify(&self, path: &Path) -> Result<(), IntegrityError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size < 1024 {
            return Err(IntegrityError::TooSmall(size));
        }
        Ok(())
    }
}

pub fn sync_service(repo: &Repository, source: Arc<dyn VideoSource>) -> SyncService {
    SyncService::new(
        repo.clone(),
        DiscoveryService::new(repo.clone(), source),
        ProgressMonitor::new(
            repo.clone(),
            Duration::from_millis(20),
            Duration::from_secs(10),
        ),
    )
}

pub async fn seed_channel(repo: &Repository, id: &str) -> Channel {
    let channel = Channel::new(id, format!("UC-{id}"), format!("Channel {id}"));
    repo.save_channel(&channel).await.unwrap();
    channel
}

pub async fn seed_video(repo: &Repository, channel_id: &str, id: &str, episode: u32, status: VideoStatus) -> Video {
    let mut video = Video::discovered(channel_id, &meta(id), episode);
    video.status = status;
    repo.save_video(&video).await.unwrap();
    video
}

/// Pop everything currently queued, oldest first.
pub async fn drain_queue(repo: &Repository) -> Vec<String> {
    let mut items = Vec::new();
    while let Some(item) = repo.claim().await.unwrap() {
        items.push(item);
    }
    items
}
