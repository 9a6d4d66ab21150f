//! Remote procedures and their parameter payloads.
//!
//! The procedures live in the backend's SQL layer. Each one debits or grants
//! credits atomically with its row changes; the client only names them and
//! passes parameters.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use evalhub_core::{
    AdminDashboardStats, AnswerId, AnswerStatus, CreditType, SessionId, SubjectId, TicketId,
    TicketPriority, TicketType, UserDashboard, UserId,
};

/// The closed set of procedures this client calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProcedure {
    /// Insert an answer and debit one GS or specialized credit.
    SubmitAnswer,
    /// Insert a session request and debit one mentorship credit.
    RequestMentorship,
    /// Record marks and remarks for an answer.
    EvaluateAnswer,
    /// Give an answer to a faculty member.
    AssignAnswerToFaculty,
    /// Change a balance and append to the ledger.
    AdjustUserCredits,
    /// Cancel a session and refund the credit.
    CancelMentorshipByStudent,
    /// Open a support ticket.
    CreateSupportTicket,
    /// Add a message to a ticket thread.
    ReplyToTicket,
    /// Platform-wide counters.
    GetAdminDashboardStats,
    /// Per-student counters.
    GetUserDashboard,
}

impl RemoteProcedure {
    /// Function name in the backend.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SubmitAnswer => "submit_answer",
            Self::RequestMentorship => "request_mentorship",
            Self::EvaluateAnswer => "evaluate_answer",
            Self::AssignAnswerToFaculty => "assign_answer_to_faculty",
            Self::AdjustUserCredits => "adjust_user_credits",
            Self::CancelMentorshipByStudent => "cancel_mentorship_by_student",
            Self::CreateSupportTicket => "create_support_ticket",
            Self::ReplyToTicket => "reply_to_ticket",
            Self::GetAdminDashboardStats => "get_admin_dashboard_stats",
            Self::GetUserDashboard => "get_user_dashboard",
        }
    }
}

/// A parameter payload bound to its procedure and result type.
pub trait ProcedureCall: Serialize + Send + Sync {
    /// Decoded result.
    type Output: DeserializeOwned + Send;

    /// The procedure these parameters belong to.
    const PROCEDURE: RemoteProcedure;
}

/// Parameters of `submit_answer`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswerParams {
    /// Subject submitted under.
    pub p_subject_id: SubjectId,
    /// The question being answered.
    pub p_question_text: String,
    /// Uploaded sheet URL.
    pub p_answer_file_url: String,
    /// Upload size in bytes.
    pub p_file_size: u64,
    /// Approximate word count.
    pub p_word_count: u32,
}

impl ProcedureCall for SubmitAnswerParams {
    type Output = AnswerId;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::SubmitAnswer;
}

/// Parameters of `request_mentorship`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMentorshipParams {
    /// What the student wants to discuss.
    pub p_notes: String,
    /// Requested length.
    pub p_duration_minutes: u32,
}

impl ProcedureCall for RequestMentorshipParams {
    type Output = SessionId;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::RequestMentorship;
}

/// Parameters of `evaluate_answer`.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateAnswerParams {
    /// Answer being evaluated.
    pub p_answer_id: AnswerId,
    /// Marks awarded.
    pub p_marks_awarded: f64,
    /// Maximum marks.
    pub p_max_marks: f64,
    /// Remarks for the student.
    pub p_remarks: String,
    /// Resulting status.
    pub p_status: AnswerStatus,
    /// Quality rating.
    pub p_rating: Option<u8>,
    /// Annotated sheet URL.
    pub p_evaluated_file_url: Option<String>,
}

impl ProcedureCall for EvaluateAnswerParams {
    type Output = IgnoredAny;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::EvaluateAnswer;
}

/// Parameters of `assign_answer_to_faculty`.
#[derive(Debug, Clone, Serialize)]
pub struct AssignAnswerParams {
    /// Answer to move.
    pub p_answer_id: AnswerId,
    /// New evaluator.
    pub p_faculty_id: UserId,
}

impl ProcedureCall for AssignAnswerParams {
    type Output = IgnoredAny;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::AssignAnswerToFaculty;
}

/// Parameters of `adjust_user_credits`.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustCreditsParams {
    /// Whose balance changes.
    pub p_user_id: UserId,
    /// Which balance.
    pub p_credit_type: CreditType,
    /// Signed change.
    pub p_amount: i64,
    /// Ledger description.
    pub p_reason: String,
}

impl ProcedureCall for AdjustCreditsParams {
    type Output = IgnoredAny;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::AdjustUserCredits;
}

/// Parameters of `cancel_mentorship_by_student`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelMentorshipParams {
    /// Session to cancel.
    pub p_session_id: SessionId,
    /// Reason shown to the mentor.
    pub p_reason: Option<String>,
}

impl ProcedureCall for CancelMentorshipParams {
    type Output = IgnoredAny;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::CancelMentorshipByStudent;
}

/// Parameters of `create_support_ticket`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTicketParams {
    /// One-line summary.
    pub p_subject: String,
    /// Full description.
    pub p_description: String,
    /// Urgency.
    pub p_priority: TicketPriority,
    /// Category.
    pub p_type: TicketType,
}

impl ProcedureCall for CreateTicketParams {
    type Output = TicketId;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::CreateSupportTicket;
}

/// Parameters of `reply_to_ticket`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyTicketParams {
    /// Ticket replied to.
    pub p_ticket_id: TicketId,
    /// Message body.
    pub p_message: String,
}

impl ProcedureCall for ReplyTicketParams {
    type Output = IgnoredAny;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::ReplyToTicket;
}

/// Parameters of `get_user_dashboard`.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboardParams {
    /// Student whose counters are wanted.
    pub p_user_id: UserId,
}

impl ProcedureCall for UserDashboardParams {
    type Output = UserDashboard;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::GetUserDashboard;
}

/// Parameters of `get_admin_dashboard_stats` (none).
#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboardParams {}

impl ProcedureCall for AdminDashboardParams {
    type Output = AdminDashboardStats;
    const PROCEDURE: RemoteProcedure = RemoteProcedure::GetAdminDashboardStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_params_use_backend_names() {
        let params = EvaluateAnswerParams {
            p_answer_id: AnswerId::generate(),
            p_marks_awarded: 6.5,
            p_max_marks: 10.0,
            p_remarks: "Good structure".into(),
            p_status: AnswerStatus::Completed,
            p_rating: Some(4),
            p_evaluated_file_url: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["p_status"], "completed");
        assert_eq!(json["p_evaluated_file_url"], serde_json::Value::Null);
        assert_eq!(
            <EvaluateAnswerParams as ProcedureCall>::PROCEDURE.name(),
            "evaluate_answer"
        );
    }

    #[test]
    fn admin_dashboard_params_are_empty_object() {
        let json = serde_json::to_value(AdminDashboardParams {}).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
