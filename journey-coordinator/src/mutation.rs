use chrono::Utc;
use journey_core::{require_id, Journey};
use journey_shared::JourneyEvent;
use std::fmt;

use crate::coordinator::CoordinatorError;

/// A field-level change to one journey. Re-applied from scratch on every
/// attempt, always against the journey as it was just read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JourneyMutation {
    SegmentStatus { segment_id: String, status: String },
    JourneyStatus { status: String },
}

impl JourneyMutation {
    pub fn segment_status(segment_id: impl Into<String>, status: impl Into<String>) -> Self {
        JourneyMutation::SegmentStatus {
            segment_id: segment_id.into(),
            status: status.into(),
        }
    }

    pub fn journey_status(status: impl Into<String>) -> Self {
        JourneyMutation::JourneyStatus { status: status.into() }
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        match self {
            JourneyMutation::SegmentStatus { segment_id, status } => {
                require_id("Segment ID", segment_id)?;
                require_id("Status", status)?;
            }
            JourneyMutation::JourneyStatus { status } => {
                require_id("Status", status)?;
            }
        }
        Ok(())
    }

    /// Applies the change in place. Returns the previous value when something
    /// changed, `None` when the journey already had the target value.
    pub fn apply(&self, journey: &mut Journey) -> Result<Option<String>, CoordinatorError> {
        let field = match self {
            JourneyMutation::SegmentStatus { segment_id, .. } => {
                let journey_id = journey.id.clone();
                &mut journey
                    .segment_mut(segment_id)
                    .ok_or_else(|| CoordinatorError::SegmentNotFound {
                        journey_id,
                        segment_id: segment_id.clone(),
                    })?
                    .status
            }
            JourneyMutation::JourneyStatus { .. } => &mut journey.status,
        };

        let target = self.target_status();
        if field.as_str() == target {
            return Ok(None);
        }

        Ok(Some(std::mem::replace(field, target.to_string())))
    }

    pub fn target_status(&self) -> &str {
        match self {
            JourneyMutation::SegmentStatus { status, .. } => status,
            JourneyMutation::JourneyStatus { status } => status,
        }
    }

    pub(crate) fn event(&self, journey_id: &str, previous_status: String, version: u64) -> JourneyEvent {
        match self {
            JourneyMutation::SegmentStatus { segment_id, status } => JourneyEvent::SegmentStatusChanged {
                journey_id: journey_id.to_string(),
                segment_id: segment_id.clone(),
                previous_status,
                status: status.clone(),
                version,
                changed_at: Utc::now(),
            },
            JourneyMutation::JourneyStatus { status } => JourneyEvent::JourneyStatusChanged {
                journey_id: journey_id.to_string(),
                previous_status,
                status: status.clone(),
                version,
                changed_at: Utc::now(),
            },
        }
    }
}

impl fmt::Display for JourneyMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JourneyMutation::SegmentStatus { segment_id, status } => {
                write!(f, "segment {} -> {}", segment_id, status)
            }
            JourneyMutation::JourneyStatus { status } => write!(f, "journey -> {}", status),
        }
    }
}
