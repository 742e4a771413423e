//! Read-through cache of stored exchanges.
//!
//! Batch judging reads each exchange once per (config, run) unit. Stored
//! exchanges are immutable, so a cached copy never goes stale.

use std::sync::Arc;
use std::time::Duration;

use debatebench_core::Exchange;
use moka::future::Cache;

use crate::config::CacheConfig;
use crate::storage::{Storage, StorageError};

pub struct ExchangeCache {
    cache: Cache<String, Arc<Exchange>>,
    storage: Arc<dyn Storage>,
}

impl ExchangeCache {
    pub fn new(storage: Arc<dyn Storage>, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache, storage }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &CacheConfig) -> Self {
        Self::new(storage, config.max_entries, config.ttl)
    }

    /// Fetch an exchange, loading it from storage on a miss.
    ///
    /// Missing exchanges are not cached.
    pub async fn get(&self, id: &str) -> Result<Option<Arc<Exchange>>, StorageError> {
        if let Some(hit) = self.cache.get(id).await {
            return Ok(Some(hit));
        }

        match self.storage.get_exchange(id).await? {
            Some(exchange) => {
                let exchange = Arc::new(exchange);
                self.cache.insert(id.to_string(), exchange.clone()).await;
                Ok(Some(exchange))
            }
            None => Ok(None),
        }
    }

    /// Seed the cache with an exchange that was just stored.
    pub async fn insert(&self, exchange: Arc<Exchange>) {
        self.cache.insert(exchange.id().to_string(), exchange).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::complete_exchange;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_read_through() {
        let store = Arc::new(InMemoryStore::new());
        store.put_exchange(&complete_exchange("ex1")).await.unwrap();
        let cache = ExchangeCache::new(store.clone(), 100, Duration::from_secs(60));

        let first = cache.get("ex1").await.unwrap().unwrap();
        let second = cache.get("ex1").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seeded_entries_skip_storage() {
        let store = Arc::new(InMemoryStore::new());
        let cache = ExchangeCache::from_config(store, &CacheConfig::default());
        let exchange = Arc::new(complete_exchange("only-in-cache"));

        cache.insert(exchange.clone()).await;
        let hit = cache.get("only-in-cache").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&hit, &exchange));
    }
}
