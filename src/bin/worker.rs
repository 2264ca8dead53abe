//! Worker Binary - Claims videos from the unified queue and downloads them
//!
//! The first SIGINT/SIGTERM lets the in-flight video finish; a second one
//! also cuts short any upload backoff.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tubarchive::adapters::ffprobe::{ffmpeg_available, FfprobeChecker};
use tubarchive::adapters::http::{health, ControllerReporter, HealthState, HttpCollector};
use tubarchive::adapters::redis::RedisStore;
use tubarchive::adapters::ytdlp::YtDlp;
use tubarchive::application::{Repository, RetryPolicy, StoreReporter, WorkerService, WorkerSettings};
use tubarchive::config::WorkerConfig;
use tubarchive::domain::SelectionPolicy;
use tubarchive::ports::{StateStore, StatusReporter};

async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    tubarchive::logging::init();

    // 1. Adapters
    let store: Arc<dyn StateStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("failed to connect to Redis")?,
    );
    let repo = Repository::new(store.clone());
    let ytdlp = Arc::new(YtDlp::new(1).with_cookies(config.cookies_file.clone()));
    let reporter: Arc<dyn StatusReporter> = match &config.controller_url {
        Some(url) => Arc::new(ControllerReporter::new(url)?),
        None => Arc::new(StoreReporter::new(repo.clone())),
    };

    let muxer_available = ffmpeg_available().await;
    if !muxer_available {
        warn!(
            max_height = config.max_combined_height,
            "ffmpeg not found, limited to combined streams"
        );
    }

    // 2. Worker service
    let settings = WorkerSettings {
        worker_id: config.worker_id.clone(),
        storage_path: config.storage_path.clone(),
        wait_interval: config.queue_wait,
        inter_video_delay: config.download_delay,
        selection: SelectionPolicy {
            muxer_available,
            max_combined_height: config.max_combined_height,
        },
        upload: RetryPolicy::default(),
    };
    let mut worker = WorkerService::new(
        repo,
        ytdlp.clone(),
        ytdlp,
        Arc::new(FfprobeChecker::default()),
        reporter,
        settings,
    );
    if let Some(url) = &config.collector_url {
        worker = worker.with_collector(Arc::new(HttpCollector::new(url)?));
    }

    // 3. Signals
    let shutdown = CancellationToken::new();
    let abort = CancellationToken::new();
    {
        let (shutdown, abort) = (shutdown.clone(), abort.clone());
        tokio::spawn(async move {
            termination_signal().await;
            info!("Shutdown requested, finishing current video");
            shutdown.cancel();
            termination_signal().await;
            warn!("Second signal, aborting upload retries");
            abort.cancel();
        });
    }

    // 4. Health probes
    let stopped = CancellationToken::new();
    let app = health::router(HealthState::new(store, shutdown.clone(), stopped.clone()));
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), worker_id = %config.worker_id, "Worker listening");
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    // 5. Claim loop
    worker.run(&shutdown, &abort).await;
    stopped.cancel();
    server.abort();
    Ok(())
}
