//! Collector upload with exponential backoff.

use crate::ports::collector::{Collector, CollectorError, UploadRequest};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            factor: 3,
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1-based): 5s, 15s, 45s by default.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(exponent))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload to collector failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: CollectorError,
    },
    #[error("upload to collector failed: cancelled after attempt {attempt}: {last}")]
    Cancelled {
        attempt: u32,
        #[source]
        last: CollectorError,
    },
}

/// Upload, retrying every failure up to `policy.max_attempts` times. The
/// backoff follows each failed attempt, including the last one, and is cut
/// short by `cancel`. Returns the attempt that succeeded.
pub async fn upload_with_retry(
    collector: &dyn Collector,
    request: &UploadRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u32, UploadError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match collector.upload(request).await {
            Ok(()) => {
                info!(
                    video_id = %request.metadata.video_id,
                    attempt,
                    "Uploaded to collector"
                );
                return Ok(attempt);
            }
            Err(e) => e,
        };

        let delay = policy.backoff(attempt);
        warn!(
            video_id = %request.metadata.video_id,
            attempt,
            max_attempts,
            error = %err,
            delay_secs = delay.as_secs(),
            "Collector upload failed"
        );

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = cancel.cancelled() => true,
        };
        if cancelled {
            return Err(UploadError::Cancelled { attempt, last: err });
        }
        if attempt >= max_attempts {
            return Err(UploadError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::collector::{MockCollector, UploadMetadata};
    use std::path::PathBuf;
    use tokio::time::Instant;

    fn request() -> UploadRequest {
        UploadRequest {
            file_path: PathBuf::from("/tmp/v1.mp4"),
            metadata: UploadMetadata {
                video_id: "v1".into(),
                channel_id: "c1".into(),
                title: "One".into(),
                description: String::new(),
                duration: Some(60),
                upload_date: None,
                episode_number: 1,
                filename: "v1.mp4".into(),
                file_size: 4096,
            },
        }
    }

    #[test]
    fn backoff_is_five_fifteen_forty_five() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(15));
        assert_eq!(policy.backoff(3), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_collector_takes_three_attempts_and_sixty_five_seconds() {
        let mut collector = MockCollector::new();
        collector.expect_upload().times(3).returning(|_| {
            Err(CollectorError::Status {
                status: 500,
                body: "boom".into(),
            })
        });

        let started = Instant::now();
        let err = upload_with_retry(
            &collector,
            &request(),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(65), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(66), "{elapsed:?}");
        assert!(matches!(err, UploadError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt() {
        let mut collector = MockCollector::new();
        let mut calls = 0;
        collector.expect_upload().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(CollectorError::Transport("reset".into()))
            } else {
                Ok(())
            }
        });

        let attempt = upload_with_retry(
            &collector,
            &request(),
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_the_backoff_short() {
        let mut collector = MockCollector::new();
        collector
            .expect_upload()
            .times(1)
            .returning(|_| Err(CollectorError::Transport("down".into())));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let err = upload_with_retry(&collector, &request(), &RetryPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled { attempt: 1, .. }));
        assert!(err.to_string().starts_with("upload to collector failed"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
