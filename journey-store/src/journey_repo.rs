use journey_core::codec::{self, DecodeError};
use journey_core::{require_id, CacheBackend, CasOutcome, Journey, Snapshot, StoreError, StoreResult, VersionToken};
use std::collections::HashSet;
use tracing::{debug, info, warn};

const JOURNEY_KEY_PREFIX: &str = "journey:";
const JOURNEY_IDS_KEY: &str = "journey:ids";

pub fn journey_key(journey_id: &str) -> String {
    format!("{}{}", JOURNEY_KEY_PREFIX, journey_id)
}

/// Get/set of encoded journeys plus the index of known ids. Holds no locks and
/// no business rules; conditional writes are exposed for the coordinator.
pub struct AggregateStore<B> {
    backend: B,
}

impl<B: CacheBackend> AggregateStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn get(&self, journey_id: &str) -> StoreResult<Option<Journey>> {
        Ok(self.get_versioned(journey_id).await?.map(|s| s.journey))
    }

    /// Reads a journey together with the token a conditional write needs.
    pub async fn get_versioned(&self, journey_id: &str) -> StoreResult<Option<Snapshot>> {
        require_id("Journey ID", journey_id)?;

        let key = journey_key(journey_id);
        match self.backend.get(&key).await? {
            Some(raw) => {
                let snapshot = codec::decode(raw)?;
                debug!("Loaded {} at version {}", key, snapshot.token.version());
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Unconditional overwrite. The new version is one past whatever is stored.
    pub async fn set(&self, journey_id: &str, journey: &Journey) -> StoreResult<u64> {
        require_id("Journey ID", journey_id)?;
        if journey.id != journey_id {
            return Err(StoreError::InvalidArgument(format!(
                "Journey {} cannot be stored under id {}",
                journey.id, journey_id
            )));
        }
        journey.validate()?;

        let key = journey_key(journey_id);
        let current = match self.backend.get(&key).await? {
            Some(raw) => match codec::decode(raw) {
                Ok(snapshot) => snapshot.token.version(),
                Err(e) => {
                    warn!("Overwriting undecodable value at {}: {}", key, e);
                    0
                }
            },
            None => 0,
        };

        let version = current + 1;
        self.backend.set(&key, &codec::encode(version, journey)?).await?;
        Ok(version)
    }

    /// Writes `journey` only if the stored bytes are still the ones `token`
    /// was read from. On `Applied` the stored version is `token.version() + 1`.
    pub async fn compare_and_set(&self, token: &VersionToken, journey: &Journey) -> StoreResult<CasOutcome> {
        require_id("Journey ID", &journey.id)?;

        let bytes = codec::encode(token.version() + 1, journey)?;
        self.backend
            .compare_and_set(&journey_key(&journey.id), token.as_bytes(), &bytes)
            .await
    }

    pub async fn list_ids(&self) -> StoreResult<Vec<String>> {
        match self.backend.get(JOURNEY_IDS_KEY).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Decode(DecodeError::Malformed(e))),
            None => Ok(Vec::new()),
        }
    }

    /// Bulk load. Validates the whole batch before writing anything, then
    /// stores every journey at version 1 and replaces the id index with
    /// exactly the ids given. Not safe against concurrent updates.
    pub async fn initialize(&self, journeys: &[Journey]) -> StoreResult<()> {
        let mut seen = HashSet::with_capacity(journeys.len());
        for journey in journeys {
            journey.validate()?;
            if !seen.insert(journey.id.as_str()) {
                return Err(StoreError::InvalidArgument(format!(
                    "Journey {} appears more than once",
                    journey.id
                )));
            }
        }

        for journey in journeys {
            let key = journey_key(&journey.id);
            self.backend.set(&key, &codec::encode(1, journey)?).await?;
        }

        let ids: Vec<&str> = journeys.iter().map(|j| j.id.as_str()).collect();
        self.backend.set(JOURNEY_IDS_KEY, &serde_json::to_vec(&ids)?).await?;

        info!("Initialized {} journeys", journeys.len());
        Ok(())
    }
}
