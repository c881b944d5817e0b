//! Errors surfaced by the store API to callers.
//!
//! Hook transport failures and script failures are recovered where they
//! occur (the final hook status lands in the execution record, a failed
//! script means the raw bucket is posted) and never travel through this
//! type.

use std::time::Duration;

use thiserror::Error;

/// Classified store error: tells the caller *why* a mutation failed so it
/// can pick the right recovery strategy (redirect to the leader, retry, or
/// fix the input).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Mutation submitted to a follower. Redirect to the current leader.
    #[error("not leader")]
    NotLeader,

    /// The log entry did not commit within the apply timeout. Transient;
    /// safe to retry, but the state machine does not deduplicate.
    #[error("consensus apply timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed input: empty rule id, zero windows on update, unreachable
    /// join address, duplicate rule id.
    #[error("validation: {0}")]
    Validation(String),

    /// Command wire encoding/decoding failed.
    #[error("command encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error is worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}
