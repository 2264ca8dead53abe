//! Configuration for the scheduler and worker processes.
//!
//! Both load `.env` first, then read the process environment. The
//! `from_lookup` constructors take any key lookup so they can be exercised
//! without touching the real environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Raw value of `key`, with blank values treated as unset.
fn lookup<F>(get: &F, key: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(get, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn seconds<F>(get: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(get, key, default).map(Duration::from_secs)
}

/// Like [`seconds`], but zero is rejected.
fn positive_seconds<F>(get: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = seconds(get, key, default)?;
    if value.is_zero() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(value)
}

fn string_or<F>(get: &F, key: &'static str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(get, key).unwrap_or_else(|| default.to_string())
}

/// Configuration for the scheduler process.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// Redis connection URL
    pub redis_url: String,
    /// Cookie file handed to the video source
    pub cookies_file: Option<PathBuf>,
    /// Videos per listing page
    pub page_size: usize,
    pub monitor_interval: Duration,
    pub monitor_max_duration: Duration,
    pub recovery_delay: Duration,
    /// Zero disables periodic syncs
    pub sync_interval: Duration,
}

impl SchedulerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            addr: string_or(&get, "ADDR", "0.0.0.0"),
            port: parsed(&get, "PORT", 8080)?,
            redis_url: string_or(&get, "REDIS_URL", "redis://127.0.0.1/"),
            cookies_file: lookup(&get, "COOKIES_FILE").map(PathBuf::from),
            page_size: parsed(&get, "PAGE_SIZE", 50usize)?.max(1),
            monitor_interval: positive_seconds(&get, "MONITOR_INTERVAL_SECS", 10)?,
            monitor_max_duration: positive_seconds(&get, "MONITOR_MAX_SECS", 24 * 60 * 60)?,
            recovery_delay: seconds(&get, "RECOVERY_DELAY_SECS", 5)?,
            sync_interval: seconds(&get, "SYNC_INTERVAL_SECS", 0)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// Configuration for a worker process.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub addr: String,
    pub port: u16,
    pub redis_url: String,
    pub worker_id: String,
    /// Root of the per-video working directories
    pub storage_path: PathBuf,
    pub collector_url: Option<String>,
    pub controller_url: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub download_delay: Duration,
    pub queue_wait: Duration,
    pub max_combined_height: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let worker_id = lookup(&get, "WORKER_ID")
            .or_else(|| lookup(&get, "HOSTNAME"))
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

        Ok(Self {
            addr: string_or(&get, "ADDR", "0.0.0.0"),
            port: parsed(&get, "PORT", 8081)?,
            redis_url: string_or(&get, "REDIS_URL", "redis://127.0.0.1/"),
            worker_id,
            storage_path: PathBuf::from(string_or(&get, "STORAGE_PATH", "./downloads")),
            collector_url: lookup(&get, "COLLECTOR_URL"),
            controller_url: lookup(&get, "CONTROLLER_URL"),
            cookies_file: lookup(&get, "COOKIES_FILE").map(PathBuf::from),
            download_delay: seconds(&get, "DOWNLOAD_DELAY", 2)?,
            queue_wait: positive_seconds(&get, "QUEUE_WAIT_SECS", 5)?,
            max_combined_height: parsed(&get, "MAX_COMBINED_HEIGHT", 720)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn scheduler_defaults() {
        let config = SchedulerConfig::from_lookup(env_of(&[])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.redis_url, "redis://127.0.0.1/");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.monitor_interval, Duration::from_secs(10));
        assert_eq!(config.monitor_max_duration, Duration::from_secs(86_400));
        assert_eq!(config.recovery_delay, Duration::from_secs(5));
        assert!(config.sync_interval.is_zero());
        assert!(config.cookies_file.is_none());
    }

    #[test]
    fn worker_defaults_and_overrides() {
        let config = WorkerConfig::from_lookup(env_of(&[
            ("WORKER_ID", "w-7"),
            ("COLLECTOR_URL", "http://collector:9000"),
            ("CONTROLLER_URL", "  "),
            ("DOWNLOAD_DELAY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.worker_id, "w-7");
        assert_eq!(config.bind_addr(), "0.0.0.0:8081");
        assert_eq!(config.storage_path, PathBuf::from("./downloads"));
        assert_eq!(config.collector_url.as_deref(), Some("http://collector:9000"));
        assert!(config.controller_url.is_none());
        assert!(config.download_delay.is_zero());
        assert_eq!(config.queue_wait, Duration::from_secs(5));
        assert_eq!(config.max_combined_height, 720);
    }

    #[test]
    fn worker_id_falls_back_to_hostname_then_uuid() {
        let config = WorkerConfig::from_lookup(env_of(&[("HOSTNAME", "box-1")])).unwrap();
        assert_eq!(config.worker_id, "box-1");

        let config = WorkerConfig::from_lookup(env_of(&[])).unwrap();
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = WorkerConfig::from_lookup(env_of(&[("QUEUE_WAIT_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("QUEUE_WAIT_SECS"));
    }

    #[test]
    fn zero_queue_wait_is_rejected() {
        let err = WorkerConfig::from_lookup(env_of(&[("QUEUE_WAIT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "QUEUE_WAIT_SECS", .. }));
    }

    #[test]
    fn zero_monitor_interval_is_rejected() {
        let err = SchedulerConfig::from_lookup(env_of(&[("MONITOR_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MONITOR_INTERVAL_SECS", .. }));

        let config = SchedulerConfig::from_lookup(env_of(&[("MONITOR_INTERVAL_SECS", "1")]))
            .unwrap();
        assert_eq!(config.monitor_interval, Duration::from_secs(1));
    }
}
