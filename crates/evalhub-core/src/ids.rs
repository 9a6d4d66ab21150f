//! Identifier types for evalhub.
//!
//! Every row the backend hands out is keyed by a UUID. Each table gets its own
//! newtype so an answer id can never be passed where a session id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Defines a UUID-backed identifier with string serialization, parsing and display.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier (primarily for testing).
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid {
                    kind: stringify!($name),
                    value: s.to_string(),
                })?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

uuid_id_type!(UserId, "A user identifier, shared by the auth identity and its profile row.");
uuid_id_type!(AnswerId, "An answer sheet submission identifier.");
uuid_id_type!(SessionId, "A mentorship session identifier.");
uuid_id_type!(PlanId, "A purchasable plan identifier.");
uuid_id_type!(OrderId, "A one-time order identifier.");
uuid_id_type!(SubscriptionId, "A recurring subscription identifier.");
uuid_id_type!(SubjectId, "An evaluation subject identifier.");
uuid_id_type!(NotificationId, "A notification identifier.");
uuid_id_type!(TicketId, "A support ticket identifier.");
uuid_id_type!(TicketMessageId, "A support ticket message identifier.");
uuid_id_type!(ArticleId, "A help article identifier.");
uuid_id_type!(TemplateId, "A notification template identifier.");
uuid_id_type!(TransactionId, "A credit ledger entry identifier.");

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid {kind}: {value:?} is not a UUID")]
    InvalidUuid {
        /// The identifier type being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}
