//! In-process `StateStore` for single-node runs and tests.
//!
//! Every operation holds one lock for its whole duration, which gives the
//! same per-primitive atomicity as the Redis adapter.

use crate::ports::store::{StateStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

fn is_live(expires_at: &Option<Instant>) -> bool {
    expires_at.map_or(true, |at| Instant::now() < at)
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.lock()?;
        let expired = match state.strings.get(key) {
            Some((value, expires_at)) if is_live(expires_at) => return Ok(Some(value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.strings.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock()?
            .strings
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.lock()?
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        if let Some(members) = self.lock()?.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn lpush(&self, list: &str, item: &str) -> Result<(), StoreError> {
        self.lock()?
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(item.to_string());
        Ok(())
    }

    async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .lists
            .get_mut(list)
            .and_then(|items| items.pop_back()))
    }

    async fn llen(&self, list: &str) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .lists
            .get(list)
            .map_or(0, |items| items.len() as u64))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        let mut keys: Vec<String> = state
            .strings
            .iter()
            .filter(|(key, (_, expires_at))| key.starts_with(prefix) && is_live(expires_at))
            .map(|(key, _)| key.clone())
            .collect();
        keys.extend(
            state
                .sets
                .keys()
                .chain(state.lists.keys())
                .filter(|key| key.starts_with(prefix))
                .cloned(),
        );
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_push_pop_is_fifo() {
        let store = MemoryStore::new();
        for item in ["A", "B", "C"] {
            store.lpush("q", item).await.unwrap();
        }
        assert_eq!(store.llen("q").await.unwrap(), 3);
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("A"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("B"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("C"));
        assert_eq!(store.rpop("q").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_strings() {
        let store = MemoryStore::new();
        store
            .set("job", "{}", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(store.get("job").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("job").await.unwrap().is_none());
        assert!(store.scan_prefix("jo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_matches_prefix_only() {
        let store = MemoryStore::new();
        store.set("video:ab:1", "x", None).await.unwrap();
        store.set("video:abc:2", "x", None).await.unwrap();
        store.set("channel:ab", "x", None).await.unwrap();

        let keys = store.scan_prefix("video:ab:").await.unwrap();
        assert_eq!(keys, vec!["video:ab:1".to_string()]);
    }

    #[tokio::test]
    async fn set_membership() {
        let store = MemoryStore::new();
        store.sadd("channels", "c1").await.unwrap();
        store.sadd("channels", "c2").await.unwrap();
        store.sadd("channels", "c1").await.unwrap();
        store.srem("channels", "c2").await.unwrap();
        assert_eq!(store.smembers("channels").await.unwrap(), vec!["c1"]);
    }
}
