//! Worker claim-process loop.
//!
//! One video at a time: claim from the unified queue, resolve streams,
//! download, verify, optionally ship to the collector, report the outcome.
//! Nothing but the status report leaves the worker; a crash after the claim
//! loses the item until a later sync re-observes it.

use super::repository::Repository;
use super::upload::{upload_with_retry, RetryPolicy, UploadError};
use crate::domain::{QueueItem, SelectionError, SelectionPolicy, StatusUpdate, Video};
use crate::ports::collector::{Collector, UploadRequest};
use crate::ports::downloader::{DownloadError, DownloadedFile, Downloader, IntegrityChecker, IntegrityError};
use crate::ports::reporter::StatusReporter;
use crate::ports::source::{SourceError, VideoSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lower bound on the idle wait, whatever the settings say.
pub const MIN_QUEUE_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub storage_path: PathBuf,
    /// Sleep after finding the queue empty, at least [`MIN_QUEUE_WAIT`]
    pub wait_interval: Duration,
    /// Pause between two processed videos
    pub inter_video_delay: Duration,
    pub selection: SelectionPolicy,
    pub upload: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            storage_path: PathBuf::from("./downloads"),
            wait_interval: Duration::from_secs(5),
            inter_video_delay: Duration::from_secs(2),
            selection: SelectionPolicy::default(),
            upload: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("resolving streams failed: {0}")]
    Source(#[from] SourceError),
    #[error("stream selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("working directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Completed { file_path: PathBuf, file_size: u64 },
    Failed(String),
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct WorkerService {
    repo: Repository,
    source: Arc<dyn VideoSource>,
    downloader: Arc<dyn Downloader>,
    integrity: Arc<dyn IntegrityChecker>,
    reporter: Arc<dyn StatusReporter>,
    collector: Option<Arc<dyn Collector>>,
    settings: WorkerSettings,
}

impl WorkerService {
    pub fn new(
        repo: Repository,
        source: Arc<dyn VideoSource>,
        downloader: Arc<dyn Downloader>,
        integrity: Arc<dyn IntegrityChecker>,
        reporter: Arc<dyn StatusReporter>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            repo,
            source,
            downloader,
            integrity,
            reporter,
            collector: None,
            settings,
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Run until `shutdown` is cancelled. Cancellation is only observed
    /// between videos; `abort` additionally cuts upload backoffs short.
    pub async fn run(&self, shutdown: &CancellationToken, abort: &CancellationToken) -> WorkerStats {
        let worker_id = self.settings.worker_id.as_str();
        let idle_wait = self.settings.wait_interval.max(MIN_QUEUE_WAIT);
        let mut stats = WorkerStats::default();
        info!(worker_id, "Worker started");

        while !shutdown.is_cancelled() {
            let raw = match self.repo.claim().await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    pause(idle_wait, shutdown).await;
                    continue;
                }
                Err(e) => {
                    error!(worker_id, error = %e, "Queue claim failed");
                    pause(idle_wait, shutdown).await;
                    continue;
                }
            };

            let item = match raw.parse::<QueueItem>() {
                Ok(item) => item,
                Err(e) => {
                    warn!(worker_id, error = %e, "Skipping malformed queue item");
                    stats.skipped += 1;
                    continue;
                }
            };

            stats.claimed += 1;
            match self.process(&item, abort).await {
                VideoOutcome::Completed { .. } => stats.completed += 1,
                VideoOutcome::Failed(_) => stats.failed += 1,
            }
            pause(self.settings.inter_video_delay, shutdown).await;
        }

        info!(
            worker_id,
            claimed = stats.claimed,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "Worker stopped"
        );
        stats
    }

    /// Process one claimed item end to end. Failures are reported, never
    /// returned.
    pub async fn process(&self, item: &QueueItem, abort: &CancellationToken) -> VideoOutcome {
        let worker_id = self.settings.worker_id.as_str();
        info!(worker_id, channel_id = %item.channel_id, video_id = %item.video_id, "Processing video");

        let video = match self.repo.video(&item.channel_id, &item.video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => {
                debug!(video_id = %item.video_id, "No stored record, using a minimal one");
                Video::placeholder(&item.channel_id, &item.video_id)
            }
            Err(e) => {
                warn!(video_id = %item.video_id, error = %e, "Could not load video record");
                Video::placeholder(&item.channel_id, &item.video_id)
            }
        };

        self.report(item, &StatusUpdate::downloading()).await;

        let work_dir = self.work_dir(item);
        let outcome = match self.fetch(&video, &work_dir).await {
            Ok(file) => self.deliver(&video, file, &work_dir, abort).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(file) => {
                let file_path = file.path.to_string_lossy().into_owned();
                self.report(item, &StatusUpdate::completed(file_path, file.size))
                    .await;
                info!(worker_id, video_id = %item.video_id, size = file.size, "Video completed");
                VideoOutcome::Completed {
                    file_path: file.path,
                    file_size: file.size,
                }
            }
            Err(e) => {
                let message = e.to_string();
                remove_dir(&work_dir).await;
                self.report(item, &StatusUpdate::failed(message.clone()))
                    .await;
                warn!(worker_id, video_id = %item.video_id, error = %message, "Video failed");
                VideoOutcome::Failed(message)
            }
        }
    }

    fn work_dir(&self, item: &QueueItem) -> PathBuf {
        self.settings
            .storage_path
            .join(&item.channel_id)
            .join(&item.video_id)
    }

    async fn fetch(&self, video: &Video, work_dir: &Path) -> Result<DownloadedFile, ProcessError> {
        let streams = self.source.resolve_streams(&video.id).await?;
        let selection = self.settings.selection.select(&streams)?;
        debug!(
            video_id = %video.id,
            format = %selection.format_spec(),
            height = ?selection.height(),
            "Streams selected"
        );

        tokio::fs::create_dir_all(work_dir).await?;
        let file = self
            .downloader
            .download(&video.id, &selection, work_dir)
            .await?;
        self.integrity.verify(&file.path).await?;
        Ok(file)
    }

    /// Ship the verified file to the collector if one is configured. The
    /// working directory is deleted once the collector has the file.
    async fn deliver(
        &self,
        video: &Video,
        file: DownloadedFile,
        work_dir: &Path,
        abort: &CancellationToken,
    ) -> Result<DownloadedFile, ProcessError> {
        let Some(collector) = &self.collector else {
            return Ok(file);
        };
        let request = UploadRequest::for_video(video, &file);
        upload_with_retry(collector.as_ref(), &request, &self.settings.upload, abort).await?;
        remove_dir(work_dir).await;
        Ok(file)
    }

    async fn report(&self, item: &QueueItem, update: &StatusUpdate) {
        if let Err(e) = self.reporter.report(item, update).await {
            error!(
                channel_id = %item.channel_id,
                video_id = %item.video_id,
                status = ?update.status,
                error = %e,
                "Status report failed"
            );
        }
    }
}

async fn pause(delay: Duration, shutdown: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.cancelled() => {}
    }
}

async fn remove_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "Could not remove working directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{SourceVideo, StreamDescriptor, VideoStatus};
    use crate::ports::collector::{CollectorError, MockCollector};
    use crate::ports::downloader::{MockDownloader, MockIntegrityChecker};
    use crate::ports::reporter::ReportError;
    use crate::ports::source::MockVideoSource;
    use crate::ports::store::{StateStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        updates: Mutex<Vec<StatusUpdate>>,
    }

    impl RecordingReporter {
        fn statuses(&self) -> Vec<VideoStatus> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|update| update.status)
                .collect()
        }

        fn last(&self) -> StatusUpdate {
            self.updates.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn report(&self, _item: &QueueItem, update: &StatusUpdate) -> Result<(), ReportError> {
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    fn source_with_combined_stream() -> MockVideoSource {
        let mut source = MockVideoSource::new();
        source.expect_resolve_streams().returning(|_| {
            Ok(vec![StreamDescriptor {
                format_id: "18".into(),
                mime_type: r#"video/mp4; codecs="avc1.42001E, mp4a.40.2""#.into(),
                height: Some(360),
                ..StreamDescriptor::default()
            }])
        });
        source
    }

    fn writing_downloader() -> MockDownloader {
        let mut downloader = MockDownloader::new();
        downloader.expect_download().returning(|video_id, _, dir| {
            let path = dir.join(format!("{video_id}.mp4"));
            std::fs::write(&path, vec![0u8; 4096])?;
            Ok(DownloadedFile { path, size: 4096 })
        });
        downloader
    }

    fn settings(storage: &Path) -> WorkerSettings {
        WorkerSettings {
            worker_id: "w-test".into(),
            storage_path: storage.to_path_buf(),
            inter_video_delay: Duration::ZERO,
            ..WorkerSettings::default()
        }
    }

    async fn repo_with_video() -> Repository {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let meta = SourceVideo {
            id: "v1".into(),
            title: "First".into(),
            ..SourceVideo::default()
        };
        repo.save_video(&Video::discovered("c1", &meta, 1))
            .await
            .unwrap();
        repo
    }

    #[tokio::test(start_paused = true)]
    async fn collector_500_exhausts_retries_and_reports_error() {
        let storage = tempfile::tempdir().unwrap();
        let repo = repo_with_video().await;
        let reporter = Arc::new(RecordingReporter::default());
        let mut integrity = MockIntegrityChecker::new();
        integrity.expect_verify().returning(|_| Ok(()));
        let mut collector = MockCollector::new();
        collector.expect_upload().times(3).returning(|_| {
            Err(CollectorError::Status {
                status: 500,
                body: "internal".into(),
            })
        });

        let worker = WorkerService::new(
            repo,
            Arc::new(source_with_combined_stream()),
            Arc::new(writing_downloader()),
            Arc::new(integrity),
            reporter.clone(),
            settings(storage.path()),
        )
        .with_collector(Arc::new(collector));

        let outcome = worker
            .process(&QueueItem::new("c1", "v1"), &CancellationToken::new())
            .await;

        let VideoOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.contains("upload to collector failed"), "{message}");
        assert_eq!(reporter.statuses(), vec![VideoStatus::Downloading, VideoStatus::Error]);
        assert!(!storage.path().join("c1").join("v1").exists());
    }

    #[tokio::test]
    async fn integrity_failure_is_never_reported_as_completed() {
        let storage = tempfile::tempdir().unwrap();
        let repo = repo_with_video().await;
        let reporter = Arc::new(RecordingReporter::default());
        let mut integrity = MockIntegrityChecker::new();
        integrity
            .expect_verify()
            .returning(|_| Err(IntegrityError::NoMediaTracks));

        let worker = WorkerService::new(
            repo,
            Arc::new(source_with_combined_stream()),
            Arc::new(writing_downloader()),
            Arc::new(integrity),
            reporter.clone(),
            settings(storage.path()),
        );

        let outcome = worker
            .process(&QueueItem::new("c1", "v1"), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, VideoOutcome::Failed(_)));
        assert!(!reporter.statuses().contains(&VideoStatus::Completed));
        assert!(reporter.last().error.unwrap().contains("integrity check failed"));
        assert!(!storage.path().join("c1").join("v1").exists());
    }

    #[tokio::test]
    async fn without_collector_the_file_is_kept() {
        let storage = tempfile::tempdir().unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let mut integrity = MockIntegrityChecker::new();
        integrity.expect_verify().returning(|_| Ok(()));

        let worker = WorkerService::new(
            repo_with_video().await,
            Arc::new(source_with_combined_stream()),
            Arc::new(writing_downloader()),
            Arc::new(integrity),
            reporter.clone(),
            settings(storage.path()),
        );

        let outcome = worker
            .process(&QueueItem::new("c1", "v1"), &CancellationToken::new())
            .await;

        let expected = storage.path().join("c1").join("v1").join("v1.mp4");
        assert_eq!(
            outcome,
            VideoOutcome::Completed {
                file_path: expected.clone(),
                file_size: 4096
            }
        );
        assert!(expected.exists());
        assert_eq!(reporter.last().file_size, Some(4096));
    }

    #[tokio::test]
    async fn malformed_items_are_skipped() {
        let storage = tempfile::tempdir().unwrap();
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        repo.store()
            .lpush(crate::application::repository::QUEUE_KEY, "no-separator")
            .await
            .unwrap();
        let shutdown = CancellationToken::new();

        let worker = WorkerService::new(
            repo.clone(),
            Arc::new(MockVideoSource::new()),
            Arc::new(MockDownloader::new()),
            Arc::new(MockIntegrityChecker::new()),
            Arc::new(RecordingReporter::default()),
            WorkerSettings {
                wait_interval: Duration::from_millis(10),
                ..settings(storage.path())
            },
        );

        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.cancel();
        });
        let stats = worker.run(&shutdown, &CancellationToken::new()).await;

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.claimed, 0);
        assert_eq!(repo.queue_len().await.unwrap(), 0);
    }

    struct CountingStore {
        inner: MemoryStore,
        pops: AtomicUsize,
    }

    #[async_trait]
    impl StateStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }
        async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
            self.inner.sadd(set, member).await
        }
        async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
            self.inner.srem(set, member).await
        }
        async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
            self.inner.smembers(set).await
        }
        async fn lpush(&self, list: &str, item: &str) -> Result<(), StoreError> {
            self.inner.lpush(list, item).await
        }
        async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError> {
            self.pops.fetch_add(1, Ordering::SeqCst);
            self.inner.rpop(list).await
        }
        async fn llen(&self, list: &str) -> Result<u64, StoreError> {
            self.inner.llen(list).await
        }
        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.scan_prefix(prefix).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_polls_no_faster_than_wait_interval() {
        let storage = tempfile::tempdir().unwrap();
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            pops: AtomicUsize::new(0),
        });
        let worker = WorkerService::new(
            Repository::new(store.clone()),
            Arc::new(MockVideoSource::new()),
            Arc::new(MockDownloader::new()),
            Arc::new(MockIntegrityChecker::new()),
            Arc::new(RecordingReporter::default()),
            settings(storage.path()),
        );
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(21)).await;
            stop.cancel();
        });
        worker.run(&shutdown, &CancellationToken::new()).await;

        // Claims at 0s, 5s, 10s, 15s and 20s.
        let pops = store.pops.load(Ordering::SeqCst);
        assert!((4..=5).contains(&pops), "{pops} claims in 21s");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_wait_interval_still_sleeps_between_claims() {
        let storage = tempfile::tempdir().unwrap();
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            pops: AtomicUsize::new(0),
        });
        let worker = WorkerService::new(
            Repository::new(store.clone()),
            Arc::new(MockVideoSource::new()),
            Arc::new(MockDownloader::new()),
            Arc::new(MockIntegrityChecker::new()),
            Arc::new(RecordingReporter::default()),
            WorkerSettings {
                wait_interval: Duration::ZERO,
                ..settings(storage.path())
            },
        );
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stop.cancel();
        });
        worker.run(&shutdown, &CancellationToken::new()).await;

        let pops = store.pops.load(Ordering::SeqCst);
        assert!(pops <= 101, "{pops} claims in 1s");
    }
}
