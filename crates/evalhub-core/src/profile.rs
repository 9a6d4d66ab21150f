//! User profiles and roles.
//!
//! A profile row is created server-side at signup and carries the three credit
//! balances. Only backend procedures move balances; the client reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::CreditType;
use crate::UserId;

/// The role a user acts under. Decides which store and landing page applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Buys credits, submits answers, books mentorship.
    Student,
    /// Evaluates answers and runs mentorship sessions.
    Faculty,
    /// Manages users, plans, content and revenue.
    Admin,
}

impl Role {
    /// The backend's string for this role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::Admin => "admin",
        }
    }
}

/// A profile row mirrored from the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the auth identity.
    pub id: UserId,

    /// Role of the user.
    pub role: Role,

    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,

    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,

    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,

    /// Avatar image URL.
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// General studies credits.
    #[serde(default)]
    pub gs_credit_balance: i64,

    /// Specialized subject credits.
    #[serde(default)]
    pub specialized_credit_balance: i64,

    /// Mentorship session credits.
    #[serde(default)]
    pub mentorship_credit_balance: i64,

    /// Whether a faculty member accepts new assignments.
    #[serde(default)]
    pub is_available: bool,

    /// When the profile was created.
    pub created_at: DateTime<Utc>,

    /// When the profile was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Current balance for one credit type.
    #[must_use]
    pub const fn balance(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Gs => self.gs_credit_balance,
            CreditType::Specialized => self.specialized_credit_balance,
            CreditType::Mentorship => self.mentorship_credit_balance,
        }
    }

    /// Check if at least `amount` credits of a type remain.
    #[must_use]
    pub const fn has_credits(&self, credit_type: CreditType, amount: i64) -> bool {
        self.balance(credit_type) >= amount
    }

    /// Name to show in lists, falling back to the email.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unnamed user")
    }
}

/// Partial profile update. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// New phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// New avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// New availability flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,

    /// New role (admin-only path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl ProfileUpdate {
    /// True when no field would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.avatar_url.is_none()
            && self.is_available.is_none()
            && self.role.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            id: UserId::generate(),
            role: Role::Student,
            email: Some("asha@example.com".into()),
            full_name: None,
            phone: None,
            avatar_url: None,
            gs_credit_balance: 3,
            specialized_credit_balance: 0,
            mentorship_credit_balance: 1,
            is_available: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn balance_by_credit_type() {
        let p = profile();
        assert_eq!(p.balance(CreditType::Gs), 3);
        assert!(p.has_credits(CreditType::Mentorship, 1));
        assert!(!p.has_credits(CreditType::Specialized, 1));
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(profile().display_name(), "asha@example.com");
    }

    #[test]
    fn update_skips_unset_fields() {
        let update = ProfileUpdate {
            full_name: Some("Asha".into()),
            ..ProfileUpdate::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "full_name": "Asha" }));
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn profile_decodes_with_missing_optional_columns() {
        let json = serde_json::json!({
            "id": UserId::generate().to_string(),
            "role": "faculty",
            "created_at": "2024-01-01T00:00:00Z"
        });
        let p: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(p.role, Role::Faculty);
        assert_eq!(p.gs_credit_balance, 0);
    }
}
