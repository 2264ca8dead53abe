//! Per-job completion detection.

use super::repository::Repository;
use crate::domain::{ChannelStatus, SyncJob, SyncJobStatus};
use crate::ports::store::StoreError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] crate::domain::TransitionError),
}

/// Lower bound on the polling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Polls the store until a running sync job's channel has drained.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    repo: Repository,
    interval: Duration,
    max_duration: Duration,
}

impl ProgressMonitor {
    pub fn new(repo: Repository, interval: Duration, max_duration: Duration) -> Self {
        Self {
            repo,
            interval: interval.max(MIN_INTERVAL),
            max_duration,
        }
    }

    pub fn spawn(&self, job: SyncJob) -> JoinHandle<SyncJob> {
        let monitor = self.clone();
        tokio::spawn(async move { monitor.watch(job).await })
    }

    /// Poll until the job finishes or the monitor gives up. Store errors on a
    /// tick are logged and retried on the next one.
    pub async fn watch(&self, mut job: SyncJob) -> SyncJob {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.tick(&mut job).await {
                Ok(true) => return job,
                Ok(false) => {}
                Err(e) => warn!(job_id = %job.id, error = %e, "Monitor tick failed"),
            }
            if started.elapsed() >= self.max_duration {
                warn!(
                    job_id = %job.id,
                    channel_id = %job.channel_id,
                    "Monitor giving up, job left running"
                );
                return job;
            }
        }
    }

    /// One poll. Returns true once the job reached a terminal state.
    pub async fn tick(&self, job: &mut SyncJob) -> Result<bool, MonitorError> {
        if job.status.is_terminal() {
            return Ok(true);
        }
        let queue_len = self.repo.queue_len().await?;
        let progress = self.repo.channel_progress(&job.channel_id).await?;
        job.record_progress(&progress);

        if queue_len > 0 || !progress.all_processed() {
            self.repo.save_sync_job(job).await?;
            return Ok(false);
        }

        let channel_status = if progress.all_failed() {
            job.fail(format!("all {} videos failed to download", progress.failed))?;
            ChannelStatus::Error
        } else {
            job.transition(SyncJobStatus::Completed)?;
            ChannelStatus::Synced
        };
        self.repo.save_sync_job(job).await?;
        self.repo
            .set_channel_status(&job.channel_id, channel_status)
            .await?;
        info!(
            job_id = %job.id,
            channel_id = %job.channel_id,
            status = ?job.status,
            downloaded = job.downloaded_count,
            failed = job.failed_count,
            "Sync job finished"
        );
        Ok(true)
    }
}
