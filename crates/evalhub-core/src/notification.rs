//! In-app notifications and the admin-editable templates they are rendered from.
//!
//! Notifications are created by backend procedures as a side effect of state
//! changes. The only client-side mutation is toggling `is_read`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::{AnswerId, NotificationId, OrderId, SessionId, TemplateId, TicketId, UserId};

/// The closed set of notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// An answer was received.
    AnswerSubmitted,
    /// An answer was given to an evaluator.
    AnswerAssigned,
    /// Evaluation results are available.
    AnswerEvaluated,
    /// A mentorship session was requested.
    MentorshipRequested,
    /// A mentor was attached to a session.
    MentorshipAssigned,
    /// A session time was set.
    MentorshipScheduled,
    /// A session finished.
    MentorshipCompleted,
    /// A session was cancelled.
    MentorshipCancelled,
    /// Credits were added to the balance.
    CreditsAdded,
    /// A payment went through.
    PaymentSuccess,
    /// A payment failed.
    PaymentFailed,
    /// Staff replied to a support ticket.
    TicketReply,
    /// Platform announcement.
    System,
}

/// A notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification id.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Kind, which decides the shape of `data`.
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Read flag.
    pub is_read: bool,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

/// Typed view of `Notification::data`.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    /// Answer lifecycle events.
    Answer {
        /// The answer concerned.
        answer_id: AnswerId,
        /// Marks, for evaluations.
        marks_awarded: Option<f64>,
    },
    /// Mentorship lifecycle events.
    Mentorship {
        /// The session concerned.
        session_id: SessionId,
        /// Start time, for scheduling events.
        scheduled_at: Option<DateTime<Utc>>,
    },
    /// Credit grants.
    Credits {
        /// Credits added, keyed by credit type string.
        amounts: serde_json::Map<String, serde_json::Value>,
    },
    /// Payment events.
    Payment {
        /// The order concerned, when known.
        order_id: Option<OrderId>,
        /// Amount in minor units.
        amount: Option<i64>,
    },
    /// Ticket replies.
    Ticket {
        /// The ticket concerned.
        ticket_id: TicketId,
    },
    /// No structured payload.
    None,
}

#[derive(Deserialize)]
struct AnswerData {
    answer_id: AnswerId,
    #[serde(default)]
    marks_awarded: Option<f64>,
}

#[derive(Deserialize)]
struct MentorshipData {
    session_id: SessionId,
    #[serde(default)]
    scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct PaymentData {
    #[serde(default)]
    order_id: Option<OrderId>,
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Deserialize)]
struct TicketData {
    ticket_id: TicketId,
}

fn decode<T: serde::de::DeserializeOwned>(data: &serde_json::Value, context: &str) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|source| CoreError::MalformedPayload {
        context: context.to_string(),
        source,
    })
}

impl Notification {
    /// Decode `data` according to the notification type.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedPayload` if the payload lacks the fields
    /// its type requires.
    pub fn payload(&self) -> Result<NotificationPayload> {
        use NotificationType as T;

        let data = &self.data;
        Ok(match self.notification_type {
            T::AnswerSubmitted | T::AnswerAssigned | T::AnswerEvaluated => {
                let d: AnswerData = decode(data, "answer notification")?;
                NotificationPayload::Answer {
                    answer_id: d.answer_id,
                    marks_awarded: d.marks_awarded,
                }
            }
            T::MentorshipRequested
            | T::MentorshipAssigned
            | T::MentorshipScheduled
            | T::MentorshipCompleted
            | T::MentorshipCancelled => {
                let d: MentorshipData = decode(data, "mentorship notification")?;
                NotificationPayload::Mentorship {
                    session_id: d.session_id,
                    scheduled_at: d.scheduled_at,
                }
            }
            T::CreditsAdded => NotificationPayload::Credits {
                amounts: data.as_object().cloned().unwrap_or_default(),
            },
            T::PaymentSuccess | T::PaymentFailed => {
                let d: PaymentData = if data.is_null() {
                    PaymentData {
                        order_id: None,
                        amount: None,
                    }
                } else {
                    decode(data, "payment notification")?
                };
                NotificationPayload::Payment {
                    order_id: d.order_id,
                    amount: d.amount,
                }
            }
            T::TicketReply => {
                let d: TicketData = decode(data, "ticket notification")?;
                NotificationPayload::Ticket {
                    ticket_id: d.ticket_id,
                }
            }
            T::System => NotificationPayload::None,
        })
    }
}

/// An admin-editable template the backend renders notifications from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    /// Template id.
    pub id: TemplateId,
    /// Internal name.
    pub name: String,
    /// Notification kind it renders.
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Title with `{{placeholders}}`.
    pub title_template: String,
    /// Body with `{{placeholders}}`.
    pub message_template: String,
    /// Disabled templates are skipped by the backend.
    pub is_active: bool,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

/// Fields an admin writes for a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDraft {
    /// Internal name.
    pub name: String,
    /// Notification kind it renders.
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Title with `{{placeholders}}`.
    pub title_template: String,
    /// Body with `{{placeholders}}`.
    pub message_template: String,
    /// Whether the backend uses it.
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: NotificationType, data: serde_json::Value) -> Notification {
        Notification {
            id: NotificationId::generate(),
            user_id: UserId::generate(),
            notification_type: kind,
            title: "t".into(),
            message: "m".into(),
            data,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn evaluated_payload_decodes() {
        let answer_id = AnswerId::generate();
        let n = notification(
            NotificationType::AnswerEvaluated,
            serde_json::json!({ "answer_id": answer_id.to_string(), "marks_awarded": 7.5 }),
        );
        assert_eq!(
            n.payload().unwrap(),
            NotificationPayload::Answer {
                answer_id,
                marks_awarded: Some(7.5)
            }
        );
    }

    #[test]
    fn missing_session_id_is_malformed() {
        let n = notification(NotificationType::MentorshipScheduled, serde_json::json!({}));
        assert!(matches!(
            n.payload(),
            Err(CoreError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn payment_payload_tolerates_null() {
        let n = notification(NotificationType::PaymentFailed, serde_json::Value::Null);
        assert_eq!(
            n.payload().unwrap(),
            NotificationPayload::Payment {
                order_id: None,
                amount: None
            }
        );
    }

    #[test]
    fn row_uses_type_column() {
        let json = serde_json::json!({
            "id": NotificationId::generate().to_string(),
            "user_id": UserId::generate().to_string(),
            "type": "system",
            "title": "Maintenance",
            "message": "Back at 6",
            "is_read": false,
            "created_at": "2024-05-01T00:00:00Z"
        });
        let n: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(n.notification_type, NotificationType::System);
        assert_eq!(n.payload().unwrap(), NotificationPayload::None);
    }
}
