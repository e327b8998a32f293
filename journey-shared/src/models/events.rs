use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted after a status change has been committed to the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JourneyEvent {
    SegmentStatusChanged {
        journey_id: String,
        segment_id: String,
        previous_status: String,
        status: String,
        version: u64,
        changed_at: DateTime<Utc>,
    },
    JourneyStatusChanged {
        journey_id: String,
        previous_status: String,
        status: String,
        version: u64,
        changed_at: DateTime<Utc>,
    },
}

impl JourneyEvent {
    pub fn journey_id(&self) -> &str {
        match self {
            JourneyEvent::SegmentStatusChanged { journey_id, .. } => journey_id,
            JourneyEvent::JourneyStatusChanged { journey_id, .. } => journey_id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            JourneyEvent::SegmentStatusChanged { version, .. } => *version,
            JourneyEvent::JourneyStatusChanged { version, .. } => *version,
        }
    }
}
