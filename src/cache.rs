use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// TTL'd key-value cache used for catalog lookups (`catalog:{isbn}`) and
/// as the best-effort invalidation signal for page caches keyed
/// `book:{isbn}`. Values are opaque strings (serialized JSON).
///
/// Injected explicitly rather than held as a global so tests can swap in
/// their own instance.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, key: &str) -> Result<()>;
}

/// In-process cache. Expiry is checked on read; expired entries are
/// dropped lazily.
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            debug!("Invalidated cache key {}", key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_invalidate_roundtrip() {
        let cache = InMemoryCache::new();
        cache
            .set("catalog:x", "{\"title\":null}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("catalog:x").await.unwrap().as_deref(),
            Some("{\"title\":null}")
        );

        cache.invalidate("catalog:x").await.unwrap();
        assert_eq!(cache.get("catalog:x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let cache = InMemoryCache::new();
        cache
            .set("catalog:x", "v", Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(cache.get("catalog:x").await.unwrap(), None);
        assert!(cache.entries.lock().unwrap().is_empty());
    }
}
