//! Domain error types
//!
//! Validation failures raised while constructing domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote collection identifier
    #[error("Invalid collection ID: {0}")]
    InvalidCollectionId(String),

    /// Invalid incremental sync token
    #[error("Invalid sync token: {0}")]
    InvalidSyncToken(String),

    /// Requested time range is empty or reversed
    #[error("Invalid time range: {start} is not before {end}")]
    InvalidRange {
        /// Range start (RFC 3339)
        start: String,
        /// Range end (RFC 3339)
        end: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
