//! Redis adapter.
//!
//! This module provides the Redis-backed implementation of `StateStore`:
//! strings for JSON records, a set for the channel index and a list for the
//! unified download queue.

mod error;
mod pool;
mod store;

use std::time::Duration;

pub use error::RedisStoreError;
pub use pool::RedisStore;

/// Deadline for any single store round trip.
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);
/// `COUNT` hint for prefix scans.
const SCAN_BATCH: u32 = 500;
