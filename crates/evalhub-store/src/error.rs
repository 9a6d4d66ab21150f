//! Error types for the store layer.

use std::sync::Arc;

use evalhub_client::ClientError;
use evalhub_core::CoreError;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store actions.
///
/// `Clone` so one in-flight fetch can hand the same outcome to every caller
/// that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backend call failed. Displays the backend's message.
    #[error(transparent)]
    Client(Arc<ClientError>),

    /// A client-side check failed before any network call.
    #[error("{0}")]
    Validation(String),

    /// Not enough credits of the required type.
    #[error("Insufficient {credit} credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Credit label.
        credit: &'static str,
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The action needs a signed-in user.
    #[error("You must be signed in to do that")]
    NotAuthenticated,

    /// A row the action depends on is not in the cache or the backend.
    #[error("{0} not found")]
    NotFound(String),

    /// Someone else changed the row first.
    #[error("{0}")]
    Conflict(String),

    /// The payment widget was closed without paying.
    #[error("Payment cancelled")]
    PaymentCancelled,

    /// The payment gateway reported a failure.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Password recovery could not establish a session.
    #[error("{0}")]
    Recovery(String),

    /// Reading or writing the persisted identity failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        Self::Client(Arc::new(err))
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl StoreError {
    /// Whether the failure happened before any network call.
    #[must_use]
    pub const fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientCredits { .. }
                | Self::NotAuthenticated
        )
    }

    /// The backend error, when this wraps one.
    #[must_use]
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
