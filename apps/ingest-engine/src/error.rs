//! Error taxonomy for the ETL core.
//!
//! Everything below the top-level `run()` is recovered locally: extraction and
//! load failures are retried by the runner's outer loop, per-record validation
//! failures drop the offending item, and checkpoint-finalization failures are
//! logged without changing the already-decided outcome. `run()` itself never
//! surfaces an error, only a boolean.

use thiserror::Error;

use crate::store::StoreError;

/// Failures inside one ETL attempt.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Source unreachable, malformed response, or read timeout. Retried.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Persistence failure during raw or normalized load. Retried.
    #[error("load failed: {0}")]
    Load(String),

    /// Failure while finalizing checkpoint/run history. Logged only.
    #[error("checkpoint write failed: {0}")]
    Checkpoint(String),
}

impl From<StoreError> for EtlError {
    fn from(err: StoreError) -> Self {
        Self::Load(err.to_string())
    }
}

/// Per-record validation failure during transform.
///
/// Never propagates past the transform: the item is dropped and logged with
/// its payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
