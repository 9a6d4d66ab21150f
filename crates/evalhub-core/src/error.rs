//! Error types for evalhub core types.

use crate::ids::IdError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while interpreting backend records.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A record's JSON payload did not match the shape its type requires.
    #[error("malformed {context} payload: {source}")]
    MalformedPayload {
        /// What was being decoded.
        context: String,
        /// The decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A value failed a client-side validation rule.
    #[error("{0}")]
    Validation(String),
}
