//! Stored representation of a journey.
//!
//! Each value is a JSON envelope carrying a write counter next to the
//! aggregate. The counter makes the bytes of every committed write unique, so a
//! conditional write can compare the stored bytes against the bytes that were
//! read without ever confusing two writes of the same content.

use serde::{Deserialize, Serialize};

use crate::models::Journey;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed journey payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Journey payload violates invariants: {0}")]
    Invalid(String),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u64,
    journey: &'a Journey,
}

#[derive(Deserialize)]
struct Envelope {
    version: u64,
    journey: Journey,
}

/// Opaque proof of what a caller read. Only the codec can mint one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken {
    version: u64,
    raw: Vec<u8>,
}

impl VersionToken {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The exact bytes that were read; a conditional write expects these.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// A decoded aggregate together with the token of the read that produced it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub journey: Journey,
    pub token: VersionToken,
}

pub fn encode(version: u64, journey: &Journey) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&EnvelopeRef { version, journey })
}

/// Decodes a stored value. Never returns a partially decoded journey: the
/// payload must parse and satisfy the aggregate invariants.
pub fn decode(raw: Vec<u8>) -> Result<Snapshot, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(&raw)?;
    envelope
        .journey
        .validate()
        .map_err(|e| DecodeError::Invalid(e.to_string()))?;

    Ok(Snapshot {
        journey: envelope.journey,
        token: VersionToken {
            version: envelope.version,
            raw,
        },
    })
}
