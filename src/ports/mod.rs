//! Ports - Trait definitions for everything outside the core.

pub mod collector;
pub mod downloader;
pub mod reporter;
pub mod source;
pub mod store;

pub use collector::{Collector, CollectorError, UploadMetadata, UploadRequest};
pub use downloader::{DownloadError, DownloadedFile, Downloader, IntegrityChecker, IntegrityError};
pub use reporter::{ReportError, StatusReporter};
pub use source::{SourceError, SourcePage, VideoSource};
pub use store::{StateStore, StoreError};
