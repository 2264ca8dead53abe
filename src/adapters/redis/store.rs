//! Redis StateStore implementation.

use super::error::RedisStoreError;
use super::pool::RedisStore;
use super::SCAN_BATCH;
use crate::ports::store::{StateStore, StoreError};
use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use std::time::Duration;

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            let value: Option<String> = conn.get(key).await.map_err(RedisStoreError::from)?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            match ttl {
                Some(ttl) => conn
                    .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(RedisStoreError::from)?,
                None => conn
                    .set::<_, _, ()>(key, value)
                    .await
                    .map_err(RedisStoreError::from)?,
            }
            Ok(())
        })
        .await
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            conn.sadd::<_, _, ()>(set, member)
                .await
                .map_err(RedisStoreError::from)?;
            Ok(())
        })
        .await
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            conn.srem::<_, _, ()>(set, member)
                .await
                .map_err(RedisStoreError::from)?;
            Ok(())
        })
        .await
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            let members: Vec<String> = conn.smembers(set).await.map_err(RedisStoreError::from)?;
            Ok(members)
        })
        .await
    }

    async fn lpush(&self, list: &str, item: &str) -> Result<(), StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            conn.lpush::<_, _, ()>(list, item)
                .await
                .map_err(RedisStoreError::from)?;
            Ok(())
        })
        .await
    }

    async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            let item: Option<String> = conn
                .rpop(list, None)
                .await
                .map_err(RedisStoreError::from)?;
            Ok(item)
        })
        .await
    }

    async fn llen(&self, list: &str) -> Result<u64, StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            let len: u64 = conn.llen(list).await.map_err(RedisStoreError::from)?;
            Ok(len)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // A full SCAN walks the keyspace in batches; each batch gets its own deadline.
        let pattern = format!("{}*", escape_glob(prefix));
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .deadline(async {
                    let mut conn = self.conn().await?;
                    let page: (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                        .map_err(RedisStoreError::from)?;
                    Ok(page)
                })
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.deadline(async {
            let mut conn = self.conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(RedisStoreError::from)?;
            Ok(())
        })
        .await
    }
}

/// Escape glob metacharacters so ids are matched literally by `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_glob;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("tubarchive:video:c1:"), "tubarchive:video:c1:");
        assert_eq!(escape_glob("a*b?[c]"), r"a\*b\?\[c\]");
    }
}
