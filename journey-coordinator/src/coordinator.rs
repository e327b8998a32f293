use journey_core::{require_id, CacheBackend, CasOutcome, CoreError, Journey, Snapshot, StoreError, VersionToken};
use journey_shared::JourneyEvent;
use journey_store::AggregateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::mutation::JourneyMutation;
use crate::retry::RetryPolicy;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Every way an operation can end other than success. Not-found and
/// contention are distinct so callers can tell "nothing to update" from
/// "lost the race".
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Journey not found: {0}")]
    JourneyNotFound(String),

    #[error("Segment {segment_id} not found in journey {journey_id}")]
    SegmentNotFound {
        journey_id: String,
        segment_id: String,
    },

    #[error("Journey codec failure: {0}")]
    Decode(String),

    #[error("Update gave up after {attempts} conflicting attempts")]
    ContentionExhausted { attempts: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CoordinatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoordinatorError::JourneyNotFound(_) | CoordinatorError::SegmentNotFound { .. }
        )
    }
}

impl From<CoreError> for CoordinatorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => CoordinatorError::InvalidArgument(msg),
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(msg) => CoordinatorError::InvalidArgument(msg),
            StoreError::Unavailable(msg) => CoordinatorError::StoreUnavailable(msg),
            StoreError::Decode(e) => CoordinatorError::Decode(e.to_string()),
            StoreError::Encode(e) => CoordinatorError::Decode(e.to_string()),
        }
    }
}

/// What a successful update committed (or found already in place).
#[derive(Debug, Clone)]
pub struct UpdateReceipt {
    pub journey: Journey,
    /// Stored version after the call.
    pub version: u64,
    /// Conditional-write attempts used; 0 when no write was needed.
    pub attempts: u32,
    /// False when the journey already carried the target value.
    pub changed: bool,
}

/// Applies field-level changes to stored journeys with optimistic concurrency:
/// read with a version token, mutate a private copy, write back only if the
/// token still matches, otherwise re-read and re-apply.
pub struct JourneyCoordinator<B> {
    store: Arc<AggregateStore<B>>,
    policy: RetryPolicy,
    events: broadcast::Sender<JourneyEvent>,
}

impl<B: CacheBackend> JourneyCoordinator<B> {
    pub fn new(store: Arc<AggregateStore<B>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            policy: RetryPolicy::default(),
            events,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &AggregateStore<B> {
        &self.store
    }

    /// Committed changes. Each event carries the version it produced; order
    /// across concurrent callers follows `version`, not arrival.
    pub fn subscribe(&self) -> broadcast::Receiver<JourneyEvent> {
        self.events.subscribe()
    }

    pub async fn get_journey(&self, journey_id: &str) -> Result<Option<Journey>, CoordinatorError> {
        Ok(self.store.get(journey_id).await?)
    }

    pub async fn list_journey_ids(&self) -> Result<Vec<String>, CoordinatorError> {
        Ok(self.store.list_ids().await?)
    }

    /// Bulk load for setup code; replaces the id index.
    pub async fn initialize(&self, journeys: &[Journey]) -> Result<(), CoordinatorError> {
        Ok(self.store.initialize(journeys).await?)
    }

    pub async fn update_segment_status(
        &self,
        journey_id: &str,
        segment_id: &str,
        new_status: &str,
    ) -> Result<UpdateReceipt, CoordinatorError> {
        self.update(journey_id, JourneyMutation::segment_status(segment_id, new_status))
            .await
    }

    pub async fn update_journey_status(
        &self,
        journey_id: &str,
        new_status: &str,
    ) -> Result<UpdateReceipt, CoordinatorError> {
        self.update(journey_id, JourneyMutation::journey_status(new_status))
            .await
    }

    pub async fn update(
        &self,
        journey_id: &str,
        mutation: JourneyMutation,
    ) -> Result<UpdateReceipt, CoordinatorError> {
        let deadline = self.policy.deadline.map(|d| Instant::now() + d);
        self.run(journey_id, &mutation, deadline).await
    }

    /// Same as `update` with an overall budget that overrides the policy's.
    pub async fn update_with_deadline(
        &self,
        journey_id: &str,
        mutation: JourneyMutation,
        deadline: Duration,
    ) -> Result<UpdateReceipt, CoordinatorError> {
        self.run(journey_id, &mutation, Some(Instant::now() + deadline))
            .await
    }

    #[instrument(skip(self, mutation, deadline), fields(mutation = %mutation))]
    async fn run(
        &self,
        journey_id: &str,
        mutation: &JourneyMutation,
        deadline: Option<Instant>,
    ) -> Result<UpdateReceipt, CoordinatorError> {
        require_id("Journey ID", journey_id)?;
        mutation.validate()?;

        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            let Snapshot { mut journey, token } = self
                .store
                .get_versioned(journey_id)
                .await?
                .ok_or_else(|| CoordinatorError::JourneyNotFound(journey_id.to_string()))?;

            let Some(previous) = mutation.apply(&mut journey)? else {
                debug!("Already applied at version {}", token.version());
                return Ok(UpdateReceipt {
                    journey,
                    version: token.version(),
                    attempts: attempt,
                    changed: false,
                });
            };

            attempt += 1;
            match self.conditional_write(&token, &journey, deadline).await? {
                CasOutcome::Applied => {
                    let version = token.version() + 1;
                    info!("Committed version {} after {} attempt(s)", version, attempt);

                    // No subscribers is fine
                    let _ = self.events.send(mutation.event(journey_id, previous, version));

                    return Ok(UpdateReceipt {
                        journey,
                        version,
                        attempts: attempt,
                        changed: true,
                    });
                }
                CasOutcome::Mismatch | CasOutcome::Busy => {
                    debug!("Write on version {} rejected (attempt {}/{})", token.version(), attempt, max_attempts);

                    if attempt >= max_attempts {
                        warn!("Contention exhausted after {} attempts", attempt);
                        return Err(CoordinatorError::ContentionExhausted { attempts: attempt });
                    }

                    let delay = self.policy.backoff(attempt);
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        warn!("Deadline reached after {} attempts", attempt);
                        return Err(CoordinatorError::ContentionExhausted { attempts: attempt });
                    }

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One conditional write. A busy lock says nothing about staleness, so it
    /// is waited out with the same token instead of costing an attempt, for at
    /// most one lock TTL (after which any holder's lock has expired) or until
    /// the deadline. A write still busy after that counts as a conflict.
    async fn conditional_write(
        &self,
        token: &VersionToken,
        journey: &Journey,
        deadline: Option<Instant>,
    ) -> Result<CasOutcome, CoordinatorError> {
        let give_up = Instant::now() + self.store.backend().lock_ttl();

        loop {
            match self.store.compare_and_set(token, journey).await? {
                CasOutcome::Busy => {
                    let delay = self.policy.backoff(1);
                    let until = Instant::now() + delay;
                    if until >= give_up || deadline.is_some_and(|d| until >= d) {
                        return Ok(CasOutcome::Busy);
                    }
                    debug!("Lock busy, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                outcome => return Ok(outcome),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_distinct_outcomes() {
        let unavailable: CoordinatorError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(unavailable, CoordinatorError::StoreUnavailable(_)));

        let invalid: CoordinatorError = StoreError::InvalidArgument("blank".into()).into();
        assert!(matches!(invalid, CoordinatorError::InvalidArgument(_)));

        let decode: CoordinatorError = StoreError::Decode(decode_error()).into();
        assert!(matches!(decode, CoordinatorError::Decode(_)));
        assert!(!decode.is_not_found());
    }

    #[test]
    fn test_not_found_grouping() {
        assert!(CoordinatorError::JourneyNotFound("JRN-1".into()).is_not_found());
        assert!(CoordinatorError::SegmentNotFound {
            journey_id: "JRN-1".into(),
            segment_id: "SEG-404".into(),
        }
        .is_not_found());
        assert!(!CoordinatorError::ContentionExhausted { attempts: 5 }.is_not_found());
    }

    fn decode_error() -> journey_core::DecodeError {
        match journey_core::codec::decode(b"{".to_vec()) {
            Err(e) => e,
            Ok(_) => unreachable!("truncated payload decoded"),
        }
    }
}
