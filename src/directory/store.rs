use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::domain::ChannelRecord;
use crate::core::error::StoreError;
use crate::core::traits::ChannelStore;

/// In-process channel store.
///
/// Expiry is lazy: every read checks the record's deadline, and an optional
/// periodic sweep reaps what nobody reads. Callers cannot tell the
/// difference between swept and merely-expired keys.
pub struct MemoryChannelStore {
    records: Arc<RwLock<HashMap<String, ChannelRecord>>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn the best-effort expiry sweep. The task runs until aborted or
    /// the returned handle is dropped by the caller into the void.
    pub fn start_sweep(&self, every: Duration) -> JoinHandle<()> {
        let records = Arc::clone(&self.records);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let now = SystemTime::now();
                let mut map = records.write().await;
                let before = map.len();
                map.retain(|_, record| !record.is_expired(now));
                let reaped = before - map.len();
                if reaped > 0 {
                    debug!(reaped, "swept expired channel records");
                }
            }
        })
    }
}

impl Default for MemoryChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn get(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError> {
        let map = self.records.read().await;
        Ok(map
            .get(slug)
            .filter(|record| !record.is_expired(SystemTime::now()))
            .cloned())
    }

    async fn put(&self, record: &ChannelRecord) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        map.insert(record.slugs.short.clone(), record.clone());
        map.insert(record.slugs.long.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        if let Some(record) = map.remove(slug) {
            let alias = if record.slugs.short == slug {
                record.slugs.long
            } else {
                record.slugs.short
            };
            map.remove(&alias);
        }
        Ok(())
    }
}

/// Durable channel store on sled, the externally replicated variant.
///
/// The deadline travels inside the stored record and the store enforces it
/// on every access, deleting stale keys as it finds them, so callers see
/// exactly the same behavior as the in-memory variant.
pub struct SledChannelStore {
    tree: sled::Db,
}

impl SledChannelStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            tree: sled::open(path)?,
        })
    }

    fn load(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError> {
        match self.tree.get(slug.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove_both(&self, record: &ChannelRecord) -> Result<(), StoreError> {
        self.tree.remove(record.slugs.short.as_bytes())?;
        self.tree.remove(record.slugs.long.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SledChannelStore {
    async fn get(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError> {
        match self.load(slug)? {
            Some(record) if record.is_expired(SystemTime::now()) => {
                self.remove_both(&record)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, record: &ChannelRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(record.slugs.short.as_bytes(), bytes.clone())?;
        self.tree.insert(record.slugs.long.as_bytes(), bytes)?;
        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        if let Some(record) = self.load(slug)? {
            self.remove_both(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{PeerId, Slugs};

    fn record(short: &str, long: &str, ttl: Duration) -> ChannelRecord {
        let now = SystemTime::now();
        ChannelRecord {
            slugs: Slugs {
                short: short.to_string(),
                long: long.to_string(),
            },
            owner: PeerId::new("peer-1"),
            secret: "cafe".to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn memory_store_serves_both_slugs_until_expiry() {
        let store = MemoryChannelStore::new();
        store
            .put(&record("abc234", "oak-fern-mint", Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(store.get("abc234").await.unwrap().is_some());
        assert!(store.get("oak-fern-mint").await.unwrap().is_some());
        assert!(store.get("zzz999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_hides_expired_records() {
        let store = MemoryChannelStore::new();
        store
            .put(&record("abc234", "oak-fern-mint", Duration::ZERO))
            .await
            .unwrap();
        assert!(store.get("abc234").await.unwrap().is_none());
        assert!(store.get("oak-fern-mint").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_delete_removes_the_alias_too() {
        let store = MemoryChannelStore::new();
        store
            .put(&record("abc234", "oak-fern-mint", Duration::from_secs(60)))
            .await
            .unwrap();
        store.delete("oak-fern-mint").await.unwrap();
        assert!(store.get("abc234").await.unwrap().is_none());
        // deleting an absent key is fine
        store.delete("abc234").await.unwrap();
    }

    #[tokio::test]
    async fn sweep_reaps_expired_records() {
        let store = MemoryChannelStore::new();
        store
            .put(&record("abc234", "oak-fern-mint", Duration::from_millis(10)))
            .await
            .unwrap();
        let sweeper = store.start_sweep(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.abort();
        assert!(store.records.read().await.is_empty());
    }

    #[tokio::test]
    async fn sled_store_matches_memory_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledChannelStore::open(dir.path()).unwrap();

        store
            .put(&record("abc234", "oak-fern-mint", Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(store.get("abc234").await.unwrap().is_some());
        assert!(store.get("oak-fern-mint").await.unwrap().is_some());

        store.delete("abc234").await.unwrap();
        assert!(store.get("oak-fern-mint").await.unwrap().is_none());

        store
            .put(&record("def567", "ash-pond-plum", Duration::ZERO))
            .await
            .unwrap();
        assert!(store.get("def567").await.unwrap().is_none());
    }
}
