//! In-process cache backend for tests and local runs without Redis.

use async_trait::async_trait;
use journey_core::{repository::DEFAULT_LOCK_TTL, CacheBackend, CasOutcome, StoreResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct LockEntry {
    token: String,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    locks: RwLock<HashMap<String, LockEntry>>,
    latency: Duration,
    lock_ttl: Duration,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    /// Adds a delay to every get/set, imitating a network round trip. Widens
    /// the window between a read and the following write.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.round_trip().await;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.round_trip().await;
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let mut locks = self.locks.write().await;
        let now = Instant::now();

        if let Some(existing) = locks.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }

        locks.insert(
            key.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str, token: &str) -> StoreResult<()> {
        let mut locks = self.locks.write().await;
        if locks.get(key).is_some_and(|l| l.token == token) {
            locks.remove(key);
        }
        Ok(())
    }

    fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    async fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> StoreResult<CasOutcome> {
        self.round_trip().await;
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = value.to_vec();
                Ok(CasOutcome::Applied)
            }
            _ => Ok(CasOutcome::Mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_and_set_requires_expected_bytes() {
        let cache = MemoryCache::new();
        cache.set("journey:1", b"v1").await.unwrap();

        let stale = cache.compare_and_set("journey:1", b"v0", b"v2").await.unwrap();
        assert_eq!(stale, CasOutcome::Mismatch);
        assert_eq!(cache.get("journey:1").await.unwrap().unwrap(), b"v1".to_vec());

        let fresh = cache.compare_and_set("journey:1", b"v1", b"v2").await.unwrap();
        assert_eq!(fresh, CasOutcome::Applied);
        assert_eq!(cache.get("journey:1").await.unwrap().unwrap(), b"v2".to_vec());
    }

    #[tokio::test]
    async fn test_compare_and_set_on_missing_key_is_mismatch() {
        let cache = MemoryCache::new();
        let outcome = cache.compare_and_set("journey:404", b"", b"v1").await.unwrap();
        assert_eq!(outcome, CasOutcome::Mismatch);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released_or_expired() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(30);

        assert!(cache.try_lock("lock:a", "t1", ttl).await.unwrap());
        assert!(!cache.try_lock("lock:a", "t2", ttl).await.unwrap());

        // Wrong token does not release
        cache.unlock("lock:a", "t2").await.unwrap();
        assert!(!cache.try_lock("lock:a", "t2", ttl).await.unwrap());

        cache.unlock("lock:a", "t1").await.unwrap();
        assert!(cache.try_lock("lock:a", "t2", ttl).await.unwrap());

        assert!(cache.try_lock("lock:b", "t1", Duration::ZERO).await.unwrap());
        assert!(cache.try_lock("lock:b", "t2", ttl).await.unwrap());
    }
}
