//! In-memory state store
//!
//! Same contract as the SQLite backend without any persistence. Used by
//! tests and by ephemeral player setups that have no writable disk.

use super::{ChangeFeed, ChangeNotice, ConsumerId, StateStore};
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const CHANGE_CAPACITY: usize = 256;

pub struct MemoryStateStore {
    map: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<ChangeNotice>,
    value_limit: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            map: RwLock::new(HashMap::new()),
            changes,
            value_limit: usize::MAX,
        }
    }

    /// Cap single values, mirroring the SQLite backend's limit.
    pub fn with_value_limit(mut self, limit: usize) -> Self {
        self.value_limit = limit;
        self
    }

    fn notify(&self, key: &str, origin: ConsumerId) {
        let _ = self.changes.send(ChangeNotice {
            key: key.to_string(),
            origin,
        });
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str, origin: ConsumerId) -> Result<()> {
        if value.len() > self.value_limit {
            return Err(Error::Capacity {
                key: key.to_string(),
                size: value.len(),
                limit: self.value_limit,
            });
        }

        self.map
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        self.notify(key, origin);
        Ok(())
    }

    async fn remove(&self, key: &str, origin: ConsumerId) -> Result<()> {
        self.map.write().await.remove(key);
        self.notify(key, origin);
        Ok(())
    }

    fn watch(&self, me: ConsumerId) -> ChangeFeed {
        ChangeFeed::new(self.changes.subscribe(), me)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_notifies_other_consumers() {
        let store = MemoryStateStore::new();
        let writer = ConsumerId::new();
        let observer = ConsumerId::new();

        store.write("placard:currentPlay", "{}", writer).await.unwrap();

        let mut feed = store.watch(observer);
        store.remove("placard:currentPlay", writer).await.unwrap();

        let notice = feed.recv().await.unwrap();
        assert_eq!(notice.key, "placard:currentPlay");
        assert_eq!(store.read("placard:currentPlay").await.unwrap(), None);
    }

    #[tokio::test]
    async fn value_limit_applies_like_sqlite() {
        let store = MemoryStateStore::new().with_value_limit(8);
        let me = ConsumerId::new();

        store.write("placard:a", "12345678", me).await.unwrap();
        let err = store.write("placard:a", "123456789", me).await.unwrap_err();
        assert!(matches!(err, Error::Capacity { .. }));

        // Old value untouched by the failed write
        assert_eq!(
            store.read("placard:a").await.unwrap(),
            Some("12345678".to_string())
        );
    }
}
