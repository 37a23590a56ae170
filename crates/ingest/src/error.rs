//! Ingestion errors.
//!
//! These are batch-level failures. A single bad event never fails the
//! batch; it is reported as an [`EventRejection`](crate::EventRejection).

use logship_durability::StoreError;
use thiserror::Error;

/// Batch-level ingestion failure.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The batch as a whole is malformed. Not retryable.
    #[error("Invalid batch: {0}")]
    Validation(String),

    /// More events than the endpoint accepts in one batch. Not retryable.
    #[error("Batch of {count} events exceeds the limit of {max}")]
    TooLarge {
        /// Events in the batch
        count: usize,
        /// Configured limit
        max: usize,
    },

    /// Over the concurrency or rate bound. Retry later.
    #[error("Ingestion is saturated; retry later")]
    Backpressure,

    /// The Log Store could not persist the batch. Retry later.
    #[error("Log store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Whether a client should resend the batch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Backpressure | IngestError::Store(_))
    }
}
