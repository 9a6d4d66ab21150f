//! Core types for evalhub.
//!
//! Evalhub is an exam-evaluation and mentorship marketplace. Students buy
//! credits, submit answer sheets and book mentorship; faculty evaluate and
//! mentor; admins run users, plans and content. This crate holds the records
//! mirrored from the backend:
//!
//! - **Identifiers**: one UUID newtype per table (`UserId`, `AnswerId`, ...)
//! - **Profiles**: `Profile`, `Role`, the three credit balances
//! - **Work**: `Answer`, `Subject`, `MentorshipSession`
//! - **Billing**: `Plan`, `Order`, `Subscription`, `CreditTransaction`
//! - **Messaging**: `Notification`, `NotificationTemplate`, help and support
//!
//! # Credits
//!
//! Balances are integers per `CreditType`. Submitting an answer costs one GS or
//! specialized credit depending on the subject; requesting mentorship costs one
//! mentorship credit. The debit happens inside the backend procedure together
//! with the row insert; nothing here moves a balance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod answer;
pub mod billing;
pub mod credits;
pub mod dashboard;
pub mod error;
pub mod ids;
pub mod mentorship;
pub mod notification;
pub mod profile;
pub mod support;

pub use answer::{
    Answer, AnswerStatus, AnswerSubmission, NamedRef, Subject, SubjectCategory,
    ACCEPTED_ANSWER_EXTENSIONS, MAX_ANSWER_FILE_BYTES,
};
pub use billing::{
    BillingInterval, Order, OrderStatus, Plan, PlanDraft, PlanType, RevenueSummary, Subscription,
    SubscriptionStatus,
};
pub use credits::{CreditTransaction, CreditTransactionType, CreditType};
pub use dashboard::{AdminDashboardStats, UserDashboard};
pub use error::{CoreError, Result};
pub use ids::{
    AnswerId, ArticleId, IdError, NotificationId, OrderId, PlanId, SessionId, SubjectId,
    SubscriptionId, TemplateId, TicketId, TicketMessageId, TransactionId, UserId,
};
pub use mentorship::{
    MentorshipSession, MentorshipStatus, SessionFeedback, SessionUpdate,
    DEFAULT_SESSION_MINUTES, MAX_RATING, MIN_RATING,
};
pub use notification::{
    Notification, NotificationPayload, NotificationTemplate, NotificationType, TemplateDraft,
};
pub use profile::{Profile, ProfileUpdate, Role};
pub use support::{
    ArticleDraft, HelpArticle, NewTicket, SupportTicket, SupportTicketMessage, TicketPriority,
    TicketStatus, TicketType,
};
