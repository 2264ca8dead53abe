//! Scheduler Binary - Channel sync trigger surface
//!
//! Wires up:
//! - Redis state store and yt-dlp video source
//! - Sync service (discovery + progress monitor)
//! - Startup recovery and optional periodic syncs
//! - HTTP trigger API

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tubarchive::adapters::http::{api, ApiState};
use tubarchive::adapters::redis::RedisStore;
use tubarchive::adapters::ytdlp::YtDlp;
use tubarchive::application::{spawn_recovery, DiscoveryService, ProgressMonitor, Repository, SyncService};
use tubarchive::config::SchedulerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SchedulerConfig::from_env()?;
    tubarchive::logging::init();

    // 1. Adapters
    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    let repo = Repository::new(Arc::new(store));
    let source = YtDlp::new(config.page_size).with_cookies(config.cookies_file.clone());

    // 2. Application services
    let discovery = DiscoveryService::new(repo.clone(), Arc::new(source));
    let monitor = ProgressMonitor::new(
        repo.clone(),
        config.monitor_interval,
        config.monitor_max_duration,
    );
    let sync = SyncService::new(repo.clone(), discovery, monitor);

    // 3. Background tasks
    spawn_recovery(repo.clone(), config.recovery_delay);
    if !config.sync_interval.is_zero() {
        sync.spawn_periodic(config.sync_interval);
        info!(every_secs = config.sync_interval.as_secs(), "Periodic sync enabled");
    }

    // 4. HTTP
    let app = api::router(ApiState { sync, repo });
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Scheduler listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
