//! Help articles and support tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArticleId, TicketId, TicketMessageId, UserId};

/// A help centre article stored in `help_content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpArticle {
    /// Article id.
    pub id: ArticleId,
    /// Short topic key.
    pub topic: String,
    /// Headline.
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Grouping shown in the help centre.
    #[serde(default)]
    pub category: Option<String>,
    /// Unpublished articles are only visible to admins.
    #[serde(default = "published_default")]
    pub is_published: bool,
    /// Ordering within a category.
    #[serde(default)]
    pub sort_order: i32,
    /// When it was written.
    pub created_at: DateTime<Utc>,
}

const fn published_default() -> bool {
    true
}

/// Fields an admin writes for an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    /// Short topic key.
    pub topic: String,
    /// Headline.
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Grouping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Visibility.
    pub is_published: bool,
    /// Ordering within a category.
    pub sort_order: i32,
}

/// Urgency of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Urgent.
    Urgent,
}

/// What a ticket is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    /// General question.
    General,
    /// Something is broken.
    Technical,
    /// Payments and credits.
    Billing,
    /// Disputes about an evaluation.
    Evaluation,
    /// Mentorship scheduling.
    Mentorship,
}

/// Ticket lifecycle: open → `in_progress` → resolved → closed.
/// Transitions are whatever the backend allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// New.
    Open,
    /// Staff is working on it.
    InProgress,
    /// Answered.
    Resolved,
    /// Archived.
    Closed,
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    /// Ticket id.
    pub id: TicketId,
    /// Opener.
    pub user_id: UserId,
    /// One-line summary.
    pub subject: String,
    /// Full description.
    pub description: String,
    /// Urgency.
    pub priority: TicketPriority,
    /// Category.
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    /// Lifecycle state.
    pub status: TicketStatus,
    /// When it was opened.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A new ticket as sent to `create_support_ticket`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    /// One-line summary.
    pub subject: String,
    /// Full description.
    pub description: String,
    /// Urgency.
    pub priority: TicketPriority,
    /// Category.
    pub ticket_type: TicketType,
}

/// One message in a ticket thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicketMessage {
    /// Message id.
    pub id: TicketMessageId,
    /// Ticket the message belongs to.
    pub ticket_id: TicketId,
    /// Author.
    pub sender_id: UserId,
    /// Body.
    pub message: String,
    /// Written by staff rather than the opener.
    #[serde(default)]
    pub is_staff_reply: bool,
    /// When it was sent.
    pub created_at: DateTime<Utc>,
}
