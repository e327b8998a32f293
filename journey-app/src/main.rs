use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures_util::future::join_all;
use journey_coordinator::{CoordinatorError, JourneyCoordinator, RetryPolicy};
use journey_core::models::{status, Segment};
use journey_core::{CacheBackend, Journey};
use journey_store::app_config::{Config, DrillConfig};
use journey_store::{AdvisoryLockCache, AggregateStore, MemoryCache, RedisCache};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DRILL_JOURNEY_ID: &str = "JRN-DRILL-001";
const DRILL_STATUSES: [&str; 4] = [status::DEPARTED, status::BOARDING, status::DELAYED, status::CANCELLED];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "journey_app=debug,journey_coordinator=debug,journey_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let policy = RetryPolicy::from(&config.retry);

    match config.redis.url.as_deref() {
        Some(url) => {
            tracing::info!("Using Redis at {}", url);
            let ttl = Duration::from_secs(config.redis.lock_ttl_seconds);
            let redis = RedisCache::with_lock_ttl(url, ttl)
                .await
                .context("Failed to connect to Redis")?;

            if config.redis.advisory_lock {
                tracing::info!("Conditional writes go through advisory locks");
                run_drill(AdvisoryLockCache::new(redis), policy, &config.drill).await
            } else {
                run_drill(redis, policy, &config.drill).await
            }
        }
        None => {
            tracing::info!("No Redis URL configured, using the in-memory cache");
            run_drill(MemoryCache::new(), policy, &config.drill).await
        }
    }
}

fn drill_journey(segments: usize) -> anyhow::Result<Journey> {
    let booked = Utc::now();
    let segments = (1..=segments)
        .map(|i| {
            let departure = booked + chrono::Duration::days(i as i64);
            Segment::new(
                format!("SEG-{:03}", i),
                "MAD",
                "BCN",
                departure,
                departure + chrono::Duration::hours(2),
                Decimal::new(10000 + i as i64 * 100, 2),
            )
            .operated_by("Iberia", format!("IB{}", 3000 + i))
        })
        .collect();

    let mut metadata = BTreeMap::new();
    metadata.insert("drill".to_string(), "true".to_string());

    Ok(Journey::new(
        DRILL_JOURNEY_ID,
        "Drill Passenger",
        "drill@example.com",
        booked,
        status::CONFIRMED,
        segments,
        metadata,
    )?)
}

/// Seeds one journey, fires `concurrency` segment updates at it at once and
/// checks that every applied update is visible in the final state.
async fn run_drill<B: CacheBackend + 'static>(
    backend: B,
    policy: RetryPolicy,
    drill: &DrillConfig,
) -> anyhow::Result<()> {
    let segments = drill.segments.max(1);
    let coordinator = Arc::new(
        JourneyCoordinator::new(Arc::new(AggregateStore::new(backend))).with_policy(policy),
    );

    coordinator.initialize(&[drill_journey(segments)?]).await?;
    tracing::info!(
        "Seeded {} with {} segments, retry policy {:?}",
        DRILL_JOURNEY_ID,
        segments,
        coordinator.policy()
    );

    let mut events = coordinator.subscribe();
    let listener = tokio::spawn(async move {
        let mut committed = 0usize;
        while let Ok(event) = events.recv().await {
            tracing::debug!("{} now at version {}: {:?}", event.journey_id(), event.version(), event);
            committed += 1;
        }
        committed
    });

    let handles = (0..drill.concurrency).map(|n| {
        let coordinator = coordinator.clone();
        let segment_id = format!("SEG-{:03}", n % segments + 1);
        let target = DRILL_STATUSES[n % DRILL_STATUSES.len()];
        tokio::spawn(async move {
            let result = coordinator
                .update_segment_status(DRILL_JOURNEY_ID, &segment_id, target)
                .await;
            (segment_id, target, result)
        })
    });

    let mut applied = BTreeMap::new();
    let mut failed = 0usize;
    for outcome in join_all(handles).await {
        let (segment_id, target, result) = outcome?;
        match result {
            Ok(receipt) => {
                tracing::info!(
                    "{} -> {} applied at version {} ({} attempts)",
                    segment_id, target, receipt.version, receipt.attempts
                );
                applied.insert(segment_id, receipt.version);
            }
            Err(CoordinatorError::ContentionExhausted { attempts }) => {
                tracing::warn!("{} -> {} gave up after {} attempts", segment_id, target, attempts);
                failed += 1;
            }
            Err(e) => {
                tracing::error!("{} -> {} failed: {}", segment_id, target, e);
                failed += 1;
            }
        }
    }

    let journey = coordinator
        .get_journey(DRILL_JOURNEY_ID)
        .await?
        .context("Drill journey disappeared")?;

    let untouched = applied
        .keys()
        .filter(|id| journey.segment(id).map_or(true, |s| s.status == status::SCHEDULED))
        .count();

    drop(coordinator);
    let committed = listener.await?;

    tracing::info!(
        "Drill finished: {} segments updated, {} failed, {} change events, {} lost",
        applied.len(),
        failed,
        committed,
        untouched
    );

    if untouched > 0 {
        anyhow::bail!("{} applied updates are missing from the stored journey", untouched);
    }
    Ok(())
}
