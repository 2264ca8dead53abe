//! Sync job lifecycle: create, discover, hand off to the monitor.

use super::discovery::{DiscoveryOutcome, DiscoveryService};
use super::monitor::ProgressMonitor;
use super::repository::Repository;
use crate::domain::{Channel, ChannelStatus, SyncJob, SyncJobStatus, TransitionError};
use crate::ports::store::StoreError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Instrument};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("channel {0} not found")]
    ChannelNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone)]
pub struct SyncService {
    repo: Repository,
    discovery: DiscoveryService,
    monitor: ProgressMonitor,
}

impl SyncService {
    pub fn new(repo: Repository, discovery: DiscoveryService, monitor: ProgressMonitor) -> Self {
        Self {
            repo,
            discovery,
            monitor,
        }
    }

    /// Create a pending job and run discovery in a detached task. The job is
    /// returned as soon as it is stored.
    pub async fn start_sync(&self, channel_id: &str) -> Result<SyncJob, SyncError> {
        let channel = self
            .repo
            .channel(channel_id)
            .await?
            .ok_or_else(|| SyncError::ChannelNotFound(channel_id.to_string()))?;

        let job = SyncJob::new(&channel);
        self.repo.save_sync_job(&job).await?;
        info!(job_id = %job.id, channel_id = %channel.id, "Sync job created");

        let service = self.clone();
        let span = tracing::info_span!("sync", job_id = %job.id, channel_id = %channel.id);
        let pending = job.clone();
        tokio::spawn(
            async move {
                match service.discover(&channel, pending).await {
                    Ok(job) if job.status == SyncJobStatus::Running => {
                        service.monitor.watch(job).await;
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Sync job aborted"),
                }
            }
            .instrument(span),
        );

        Ok(job)
    }

    /// Run discovery for a pending job and record the outcome. Returns the job
    /// as it was last saved: `running` when videos were dispatched,
    /// `completed` when there was nothing to do, `failed` when discovery
    /// failed.
    pub async fn discover(&self, channel: &Channel, mut job: SyncJob) -> Result<SyncJob, SyncError> {
        job.transition(SyncJobStatus::Discovering)?;
        self.repo.save_sync_job(&job).await?;
        self.repo
            .set_channel_status(&channel.id, ChannelStatus::Syncing)
            .await?;

        match self.discovery.discover_and_dispatch(channel).await {
            Ok(outcome) => self.record_dispatch(channel, job, outcome).await,
            Err(e) => {
                warn!(error = %e, "Discovery failed");
                job.fail(e.to_string())?;
                self.repo.save_sync_job(&job).await?;
                self.repo
                    .set_channel_status(&channel.id, ChannelStatus::Error)
                    .await?;
                Ok(job)
            }
        }
    }

    async fn record_dispatch(
        &self,
        channel: &Channel,
        mut job: SyncJob,
        outcome: DiscoveryOutcome,
    ) -> Result<SyncJob, SyncError> {
        job.video_count = outcome.dispatched;
        job.degraded = outcome.degraded;

        if outcome.dispatched == 0 {
            job.transition(SyncJobStatus::Completed)?;
            self.repo.save_sync_job(&job).await?;
            self.repo
                .set_channel_status(&channel.id, ChannelStatus::Synced)
                .await?;
            info!(degraded = job.degraded, "Nothing to download, sync completed");
            return Ok(job);
        }

        job.transition(SyncJobStatus::Running)?;
        self.repo.save_sync_job(&job).await?;
        info!(
            new = outcome.new_videos,
            requeued = outcome.requeued,
            degraded = outcome.degraded,
            "Videos dispatched"
        );
        Ok(job)
    }

    /// Start a sync for every indexed channel not already syncing, once per
    /// `every`. The first round runs after one full interval.
    pub fn spawn_periodic(&self, every: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = service.sync_all().await {
                    warn!(error = %e, "Periodic sync round failed");
                }
            }
        })
    }

    /// Returns the jobs started.
    pub async fn sync_all(&self) -> Result<Vec<SyncJob>, SyncError> {
        let mut started = Vec::new();
        for channel_id in self.repo.channel_ids().await? {
            match self.repo.channel(&channel_id).await? {
                Some(channel) if channel.status == ChannelStatus::Syncing => continue,
                Some(_) => started.push(self.start_sync(&channel_id).await?),
                None => continue,
            }
        }
        Ok(started)
    }
}
