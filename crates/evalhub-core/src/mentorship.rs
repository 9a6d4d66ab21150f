//! Mentorship sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::NamedRef;
use crate::error::{CoreError, Result};
use crate::{SessionId, UserId};

/// Length of a session when the student does not pick one.
pub const DEFAULT_SESSION_MINUTES: u32 = 30;

/// Lowest feedback rating.
pub const MIN_RATING: u8 = 1;

/// Highest feedback rating.
pub const MAX_RATING: u8 = 5;

/// Session lifecycle: requested → assigned → scheduled → `in_progress` →
/// {completed | cancelled | `no_show`}. The backend decides which moves are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentorshipStatus {
    /// Student asked for a session.
    Requested,
    /// A mentor was attached.
    Assigned,
    /// A time was agreed.
    Scheduled,
    /// The session is running.
    InProgress,
    /// The session took place.
    Completed,
    /// Called off by either side.
    Cancelled,
    /// The student did not attend.
    NoShow,
}

impl MentorshipStatus {
    /// The backend's string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Assigned => "assigned",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// No further transitions happen from here.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// A student may still withdraw the request.
    #[must_use]
    pub const fn is_cancellable_by_student(&self) -> bool {
        matches!(self, Self::Requested | Self::Assigned | Self::Scheduled)
    }
}

/// A session row mirrored from `mentorship_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorshipSession {
    /// Session id.
    pub id: SessionId,
    /// Requesting student.
    pub student_id: UserId,
    /// Mentor, once assigned.
    #[serde(default)]
    pub mentor_id: Option<UserId>,
    /// Current status.
    pub status: MentorshipStatus,
    /// What the student wants to discuss.
    #[serde(default)]
    pub notes: Option<String>,
    /// Mentor's private notes.
    #[serde(default)]
    pub mentor_notes: Option<String>,
    /// Agreed start time.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Planned length.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Video call link.
    #[serde(default)]
    pub meeting_link: Option<String>,
    /// When the mentor started the call.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the mentor ended the call.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Why it was cancelled.
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    /// Student rating, 1 to 5.
    #[serde(default)]
    pub student_rating: Option<u8>,
    /// Student feedback text.
    #[serde(default)]
    pub student_feedback: Option<String>,
    /// When the request was made.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Joined student name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<NamedRef>,
    /// Joined mentor name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentor: Option<NamedRef>,
}

/// Partial update written straight to the `mentorship_sessions` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MentorshipStatus>,
    /// Reassigned mentor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentor_id: Option<UserId>,
    /// New start time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// New length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// New call link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
    /// Mentor notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentor_notes: Option<String>,
    /// Cancellation reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

/// Student feedback on a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFeedback {
    /// Rating, 1 to 5.
    pub student_rating: u8,
    /// Optional comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_feedback: Option<String>,
}

impl SessionFeedback {
    /// Check the rating range and that the session has finished.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the rating is outside 1..=5 or the
    /// session is not completed.
    pub fn validate_for(&self, status: MentorshipStatus) -> Result<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.student_rating) {
            return Err(CoreError::Validation(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if status != MentorshipStatus::Completed {
            return Err(CoreError::Validation(
                "Feedback can only be given for completed sessions".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_cancellable_states() {
        assert!(MentorshipStatus::NoShow.is_terminal());
        assert!(!MentorshipStatus::InProgress.is_terminal());
        assert!(MentorshipStatus::Scheduled.is_cancellable_by_student());
        assert!(!MentorshipStatus::InProgress.is_cancellable_by_student());
    }

    #[test]
    fn feedback_rating_bounds() {
        let feedback = |rating| SessionFeedback {
            student_rating: rating,
            student_feedback: None,
        };
        assert!(feedback(0).validate_for(MentorshipStatus::Completed).is_err());
        assert!(feedback(6).validate_for(MentorshipStatus::Completed).is_err());
        assert!(feedback(1).validate_for(MentorshipStatus::Completed).is_ok());
        assert!(feedback(5).validate_for(MentorshipStatus::Completed).is_ok());
    }

    #[test]
    fn feedback_requires_completed_session() {
        let feedback = SessionFeedback {
            student_rating: 4,
            student_feedback: Some("Helpful".into()),
        };
        assert!(feedback.validate_for(MentorshipStatus::Scheduled).is_err());
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&MentorshipStatus::NoShow).unwrap();
        assert_eq!(json, "\"no_show\"");
        assert_eq!(MentorshipStatus::InProgress.as_str(), "in_progress");
    }
}
