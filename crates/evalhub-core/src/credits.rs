//! Credit types and the credit ledger.
//!
//! Balances live on the profile; every change the backend makes is also
//! appended to `credit_transactions`, which only admins can read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// The three consumable credit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    /// General studies answer evaluation.
    Gs,
    /// Specialized (optional subject) answer evaluation.
    Specialized,
    /// One mentorship session.
    Mentorship,
}

impl CreditType {
    /// The backend's string for this credit type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gs => "gs",
            Self::Specialized => "specialized",
            Self::Mentorship => "mentorship",
        }
    }

    /// Human label used in notices.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Gs => "GS",
            Self::Specialized => "specialized",
            Self::Mentorship => "mentorship",
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Ledger entry id.
    pub id: TransactionId,

    /// Whose balance changed.
    pub user_id: UserId,

    /// Which balance changed.
    pub credit_type: CreditType,

    /// Signed change. Positive = credit, negative = debit.
    pub amount: i64,

    /// Balance after this entry.
    pub balance_after: i64,

    /// Why the balance changed.
    pub transaction_type: CreditTransactionType,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,

    /// Related row (answer, session, order).
    #[serde(default)]
    pub reference_id: Option<String>,

    /// Admin who made a manual adjustment.
    #[serde(default)]
    pub created_by: Option<UserId>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Reason for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    /// Credits granted by a one-time plan purchase.
    Purchase,
    /// Credits granted by a subscription period.
    Subscription,
    /// Credit spent on an answer submission.
    AnswerSubmission,
    /// Credit spent on a mentorship request.
    MentorshipRequest,
    /// Credit returned after a cancellation.
    Refund,
    /// Manual change by an admin.
    AdminAdjustment,
    /// Promotional credits.
    Bonus,
}

impl CreditTransactionType {
    /// Check if this entry type adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Purchase | Self::Subscription | Self::Refund | Self::Bonus
        )
    }

    /// Check if this entry type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::AnswerSubmission | Self::MentorshipRequest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_is_credit_debit() {
        assert!(CreditTransactionType::Purchase.is_credit());
        assert!(CreditTransactionType::Refund.is_credit());
        assert!(CreditTransactionType::AnswerSubmission.is_debit());
        assert!(!CreditTransactionType::AnswerSubmission.is_credit());
        // Adjustments can go either way; the sign of `amount` decides.
        assert!(!CreditTransactionType::AdminAdjustment.is_credit());
        assert!(!CreditTransactionType::AdminAdjustment.is_debit());
    }

    #[test]
    fn ledger_entry_decodes() {
        let json = serde_json::json!({
            "id": TransactionId::generate().to_string(),
            "user_id": UserId::generate().to_string(),
            "credit_type": "mentorship",
            "amount": -1,
            "balance_after": 2,
            "transaction_type": "mentorship_request",
            "created_at": "2024-03-01T10:00:00Z"
        });
        let tx: CreditTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx.credit_type, CreditType::Mentorship);
        assert_eq!(tx.amount, -1);
        assert!(tx.description.is_none());
    }
}
