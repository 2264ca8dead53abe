use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to encode or decode record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid id {0:?}, ids must be non-empty and must not contain ':'")]
    InvalidId(String),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }
}

/// The shared key-value substrate. Every method maps to one atomic
/// primitive of the backing store; no method may combine several.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SET key value [EX ttl]`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError>;

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError>;

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Push onto the head of a list.
    async fn lpush(&self, list: &str, item: &str) -> Result<(), StoreError>;

    /// Pop from the tail of a list. Paired with `lpush` this is FIFO.
    async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError>;

    async fn llen(&self, list: &str) -> Result<u64, StoreError>;

    /// All keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
