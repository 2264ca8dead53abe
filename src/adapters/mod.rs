//! Adapters - Concrete implementations of ports.

pub mod ffprobe;
pub mod http;
pub mod memory;
pub mod ytdlp;

#[cfg(feature = "redis")]
pub mod redis;
