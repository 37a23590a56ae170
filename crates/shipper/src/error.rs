//! Error types for the shipper.
//!
//! A [`ShipError`] always belongs to one file. It is recorded in that
//! file's upload state and never stops the cycle.

use logship_durability::{StateError, StoreError};
use std::io;
use thiserror::Error;

/// Object storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with an error
    #[error("Remote error: {0}")]
    Remote(String),

    /// No such object
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Failure shipping one file.
#[derive(Debug, Error)]
pub enum ShipError {
    /// Reading or compressing the local file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The object store could not be reached or refused the request
    #[error(transparent)]
    Network(#[from] ObjectStoreError),

    /// The stored object does not match what was sent
    #[error("Integrity check failed for {key}: {reason}")]
    Integrity {
        /// Object key
        key: String,
        /// What did not match
        reason: String,
    },

    /// The upload state could not be read or written
    #[error(transparent)]
    State(#[from] StateError),

    /// The log directory could not be listed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for shipper operations.
pub type ShipResult<T> = std::result::Result<T, ShipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ShipError::Integrity {
            key: "logs/a".into(),
            reason: "size 3 != 4".into(),
        };
        assert!(err.to_string().contains("logs/a"));

        let err: ShipError = ObjectStoreError::Network("timed out".into()).into();
        assert_eq!(err.to_string(), "Network error: timed out");
    }
}
