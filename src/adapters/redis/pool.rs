//! Redis connection pool.

use super::error::RedisStoreError;
use super::STORE_CALL_TIMEOUT;
use crate::ports::store::StoreError;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use std::fmt;
use std::future::Future;
use tracing::info;

/// Redis-backed shared state store.
#[derive(Clone)]
pub struct RedisStore {
    pub(super) pool: Pool,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisStore {
    /// Create a new RedisStore with connection pool.
    pub fn new(redis_url: &str) -> Result<Self, RedisStoreError> {
        let mut cfg = Config::from_url(redis_url);
        let mut pool_cfg = PoolConfig::default();
        pool_cfg.timeouts.wait = Some(STORE_CALL_TIMEOUT);
        pool_cfg.timeouts.create = Some(STORE_CALL_TIMEOUT);
        pool_cfg.timeouts.recycle = Some(STORE_CALL_TIMEOUT);
        cfg.pool = Some(pool_cfg);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    /// Create the pool and make sure the server answers.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let store = Self::new(redis_url)?;
        crate::ports::store::StateStore::ping(&store).await?;
        info!("Connected to Redis");
        Ok(store)
    }

    pub(super) async fn conn(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await.map_err(RedisStoreError::from)?)
    }

    /// Bound a single store call by the per-call deadline.
    pub(super) async fn deadline<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(STORE_CALL_TIMEOUT, call)
            .await
            .map_err(|_| StoreError::Timeout(STORE_CALL_TIMEOUT))?
    }
}
