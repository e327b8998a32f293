pub mod codec;
pub mod models;
pub mod repository;

pub use codec::{DecodeError, Snapshot, VersionToken};
pub use models::{Journey, Segment};
pub use repository::{CacheBackend, CasOutcome, StoreError, StoreResult};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Rejects empty or whitespace-only identifiers.
pub fn require_id(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationError(format!("{} cannot be empty", field)));
    }
    Ok(())
}
