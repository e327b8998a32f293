use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::codec::DecodeError;
use crate::CoreError;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Stored journey could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("Journey could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => StoreError::InvalidArgument(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The stored value was not the expected one. Nothing was written.
    Mismatch,
    /// Another writer held the key's lock, or this writer's hold may have
    /// expired before the write. Nothing was written and nothing stale was
    /// observed, so the same token can be tried again.
    Busy,
}

/// Key/value cache the journey store runs on.
///
/// Backends with a native conditional write override `compare_and_set`. The
/// provided implementation synthesizes it from the advisory lock, which is only
/// sound when every conditional writer of a key goes through the same lock,
/// and `lock_ttl` must stay well above a get plus a set round trip: a hold that
/// outlives its TTL is given up before writing.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// `SET key token NX` with an expiry. Returns whether the lock was taken.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Releases the lock only if it is still held by `token`.
    async fn unlock(&self, key: &str, token: &str) -> StoreResult<()>;

    fn lock_ttl(&self) -> Duration {
        DEFAULT_LOCK_TTL
    }

    async fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> StoreResult<CasOutcome> {
        let lock = lock_key(key);
        let token = Uuid::new_v4().to_string();
        let ttl = self.lock_ttl();

        if !self.try_lock(&lock, &token, ttl).await? {
            return Ok(CasOutcome::Busy);
        }
        let acquired = Instant::now();

        let outcome = match self.get(key).await {
            Ok(current) if current.as_deref() == Some(expected) => {
                if acquired.elapsed() >= ttl {
                    warn!("Lock {} may have expired before the write, skipping it", lock);
                    Ok(CasOutcome::Busy)
                } else {
                    self.set(key, value).await.map(|_| CasOutcome::Applied)
                }
            }
            Ok(_) => Ok(CasOutcome::Mismatch),
            Err(e) => Err(e),
        };

        // An unlock failure leaves the lock to expire on its own; the write
        // outcome above is still the truth.
        if let Err(e) = self.unlock(&lock, &token).await {
            warn!("Failed to release lock {}: {}", lock, e);
        }

        outcome
    }
}

pub fn lock_key(key: &str) -> String {
    format!("lock:{}", key)
}
