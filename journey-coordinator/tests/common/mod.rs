#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use journey_core::models::{status, Segment};
use journey_core::{CacheBackend, CasOutcome, Journey, StoreError, StoreResult};
use journey_store::MemoryCache;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

pub const JOURNEY_ID: &str = "JRN-TEST-001";

pub fn segment_id(i: usize) -> String {
    format!("SEG-{:03}", i)
}

/// Target status for segment `i` in the 20-segment scenarios.
pub fn target_status(i: usize) -> &'static str {
    if i % 4 == 0 {
        status::CANCELLED
    } else if i % 3 == 0 {
        status::DELAYED
    } else if i % 2 == 0 {
        status::BOARDING
    } else {
        status::DEPARTED
    }
}

pub fn test_journey(id: &str, segments: usize) -> Journey {
    let booked = Utc::now();
    let segments = (1..=segments)
        .map(|i| {
            let departure = booked + Duration::days(i as i64);
            Segment::new(
                segment_id(i),
                "MAD",
                "BCN",
                departure,
                departure + Duration::hours(2),
                Decimal::new(10000 + i as i64 * 100, 2),
            )
            .operated_by("Iberia", format!("IB{}", 3000 + i))
        })
        .collect();

    let mut metadata = BTreeMap::new();
    metadata.insert("testRun".to_string(), "true".to_string());

    Journey::new(id, "Test User", "test@test.com", booked, status::CONFIRMED, segments, metadata)
        .expect("valid test journey")
}

/// Which backend calls fail with `StoreError::Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    None,
    Reads,
    Writes,
}

/// Memory cache that counts calls and can be told to reject every
/// conditional write, as if another writer always got there first, or to
/// fail reads or writes as if the backend went away.
pub struct InstrumentedCache {
    pub inner: MemoryCache,
    pub reject_writes: bool,
    pub outage: Outage,
    pub gets: AtomicU32,
    pub cas_calls: AtomicU32,
}

impl InstrumentedCache {
    pub fn new(inner: MemoryCache) -> Self {
        Self {
            inner,
            reject_writes: false,
            outage: Outage::None,
            gets: AtomicU32::new(0),
            cas_calls: AtomicU32::new(0),
        }
    }

    pub fn always_contended(inner: MemoryCache) -> Self {
        Self {
            reject_writes: true,
            ..Self::new(inner)
        }
    }

    pub fn unavailable(inner: MemoryCache, outage: Outage) -> Self {
        Self {
            outage,
            ..Self::new(inner)
        }
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn cas_calls(&self) -> u32 {
        self.cas_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for InstrumentedCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.outage == Outage::Reads {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: std::time::Duration) -> StoreResult<bool> {
        self.inner.try_lock(key, token, ttl).await
    }

    async fn unlock(&self, key: &str, token: &str) -> StoreResult<()> {
        self.inner.unlock(key, token).await
    }

    async fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> StoreResult<CasOutcome> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        if self.outage == Outage::Writes {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        if self.reject_writes {
            return Ok(CasOutcome::Mismatch);
        }
        self.inner.compare_and_set(key, expected, value).await
    }
}
