use super::repository::Repository;
use crate::domain::ChannelStatus;
use crate::ports::store::StoreError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Channels found in `syncing`
    pub examined: usize,
    /// Channels flipped to `synced`
    pub recovered: usize,
}

/// Flip channels stuck in `syncing` whose videos are all processed back to
/// `synced`. Discovery is not re-run.
pub async fn recover_stuck_channels(repo: &Repository) -> Result<RecoveryReport, StoreError> {
    let mut report = RecoveryReport::default();
    for channel_id in repo.channel_ids().await? {
        let Some(channel) = repo.channel(&channel_id).await? else {
            debug!(channel_id = %channel_id, "Indexed channel has no record");
            continue;
        };
        if channel.status != ChannelStatus::Syncing {
            continue;
        }
        report.examined += 1;
        if repo.all_processed(&channel_id).await? {
            repo.set_channel_status(&channel_id, ChannelStatus::Synced)
                .await?;
            report.recovered += 1;
            info!(channel_id = %channel_id, "Recovered stuck channel");
        }
    }
    Ok(report)
}

/// Run one recovery sweep after `delay`.
pub fn spawn_recovery(repo: Repository, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match recover_stuck_channels(&repo).await {
            Ok(report) => info!(
                examined = report.examined,
                recovered = report.recovered,
                "Startup recovery finished"
            ),
            Err(e) => warn!(error = %e, "Startup recovery failed"),
        }
    })
}
