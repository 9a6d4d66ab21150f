//! Aggregates returned by the dashboard procedures.
//!
//! Both are computed by the backend; every field defaults so an older backend
//! that omits a counter still decodes.

use serde::{Deserialize, Serialize};

/// Result of `get_user_dashboard` for a student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDashboard {
    /// Answers ever submitted.
    pub total_answers: u64,
    /// Answers waiting for or under evaluation.
    pub pending_answers: u64,
    /// Answers evaluated.
    pub completed_answers: u64,
    /// Mean marks over evaluated answers.
    pub average_marks: Option<f64>,
    /// Sessions not yet finished.
    pub upcoming_sessions: u64,
    /// Sessions held.
    pub completed_sessions: u64,
    /// Unread notifications.
    pub unread_notifications: u64,
}

/// Result of `get_admin_dashboard_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminDashboardStats {
    /// Registered students.
    pub total_students: u64,
    /// Registered faculty.
    pub total_faculty: u64,
    /// Answers ever submitted.
    pub total_answers: u64,
    /// Answers without an evaluator.
    pub pending_answers: u64,
    /// Answers assigned or in evaluation.
    pub in_progress_answers: u64,
    /// Answers evaluated.
    pub completed_answers: u64,
    /// Captured revenue in minor units.
    pub total_revenue: i64,
    /// Subscriptions currently active.
    pub active_subscriptions: u64,
    /// Sessions not yet finished.
    pub open_mentorship_sessions: u64,
    /// Open support tickets.
    pub open_tickets: u64,
}
