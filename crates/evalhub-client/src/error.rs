//! Client error types.

/// Errors that can occur when talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the call. `message` is the backend's own wording.
    #[error("{message}")]
    Api {
        /// Structured error code, when the backend sent one.
        code: Option<String>,
        /// Error message, shown to users verbatim.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The call needs a signed-in session and there is none.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A single-row read matched nothing.
    #[error("no matching row in {table}")]
    NotFound {
        /// Table that was queried.
        table: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Structured error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of a backend rejection.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Codes some auth backends use for a sign-in while a session already exists.
const ALREADY_AUTHENTICATED_CODES: &[&str] = &["already_authenticated", "session_exists"];

/// Wording used when the backend only sends text.
const ALREADY_AUTHENTICATED_PHRASES: &[&str] = &[
    "already signed in",
    "already logged in",
    "already authenticated",
];

/// Check whether a sign-in failure only means "a session already exists".
///
/// This is the benign race of a double-submitted login form; the caller should
/// continue as if the sign-in succeeded. The structured code is checked first
/// and the message text only when no code was sent.
#[must_use]
pub fn is_already_authenticated(err: &ClientError) -> bool {
    let ClientError::Api { code, message, .. } = err else {
        return false;
    };
    if let Some(code) = code {
        return ALREADY_AUTHENTICATED_CODES.contains(&code.as_str());
    }
    let message = message.to_ascii_lowercase();
    ALREADY_AUTHENTICATED_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}
