//! Tubarchive - Channel sync scheduler and download workers
//!
//! Hexagonal Architecture:
//! - domain/: Records and pure rules (channels, videos, sync jobs, streams)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (Redis, yt-dlp, ffprobe, HTTP)
//! - application/: Discovery, monitor, recovery and worker services
//! - config: Environment configuration
//!
//! # Features
//! - `redis`: Redis-backed shared state store, required by the binaries

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

pub use config::{ConfigError, SchedulerConfig, WorkerConfig};
