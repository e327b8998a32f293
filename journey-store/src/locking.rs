use async_trait::async_trait;
use journey_core::{CacheBackend, StoreResult};
use std::time::Duration;

/// Runs conditional writes through the per-key advisory lock instead of the
/// backend's native compare-and-set. For caches that only offer plain GET/SET
/// plus `SET NX`.
pub struct AdvisoryLockCache<B> {
    inner: B,
}

impl<B: CacheBackend> AdvisoryLockCache<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for AdvisoryLockCache<B> {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.try_lock(key, token, ttl).await
    }

    async fn unlock(&self, key: &str, token: &str) -> StoreResult<()> {
        self.inner.unlock(key, token).await
    }

    fn lock_ttl(&self) -> Duration {
        self.inner.lock_ttl()
    }
}
