//! Application layer - Services that drive the ports.
//!
//! The scheduler side is `SyncService` (discovery, monitor, recovery); the
//! worker side is `WorkerService`. They share nothing but the `Repository`.

pub mod discovery;
pub mod monitor;
pub mod recovery;
pub mod reporter;
pub mod repository;
pub mod sync;
pub mod upload;
pub mod worker;

pub use discovery::{DiscoveryError, DiscoveryOutcome, DiscoveryService};
pub use monitor::ProgressMonitor;
pub use recovery::{recover_stuck_channels, spawn_recovery, RecoveryReport};
pub use reporter::StoreReporter;
pub use repository::Repository;
pub use sync::{SyncError, SyncService};
pub use upload::{upload_with_retry, RetryPolicy, UploadError};
pub use worker::{VideoOutcome, WorkerService, WorkerSettings, WorkerStats};
