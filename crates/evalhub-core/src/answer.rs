//! Answer sheets and evaluation subjects.
//!
//! An answer is created by the `submit_answer` procedure, which debits one
//! credit of the subject's type in the same transaction. Faculty move it
//! through evaluation; admins may reassign it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::CreditType;
use crate::error::{CoreError, Result};
use crate::{AnswerId, SubjectId, UserId};

/// Largest accepted answer sheet upload (10 MiB).
pub const MAX_ANSWER_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// File extensions accepted for answer sheets.
pub const ACCEPTED_ANSWER_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// Lifecycle of an answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Submitted, waiting for an evaluator.
    Pending,
    /// Assigned to a faculty member.
    Assigned,
    /// The evaluator has started.
    InEvaluation,
    /// Marks and remarks are available.
    Completed,
    /// Withdrawn or rejected.
    Cancelled,
}

impl AnswerStatus {
    /// The backend's string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InEvaluation => "in_evaluation",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No further transitions happen from here.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Work still sits with the assigned evaluator.
    #[must_use]
    pub const fn is_open_assignment(&self) -> bool {
        matches!(self, Self::Assigned | Self::InEvaluation)
    }

    /// Status the evaluation form pre-selects. Not a transition rule.
    #[must_use]
    pub const fn evaluation_default(&self) -> Self {
        match self {
            Self::Assigned => Self::InEvaluation,
            other => *other,
        }
    }
}

/// Whether a subject is paid for with GS or specialized credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectCategory {
    /// General studies paper.
    Gs,
    /// Optional or specialized paper.
    Specialized,
}

impl SubjectCategory {
    /// Credit consumed by a submission in this category.
    #[must_use]
    pub const fn credit_type(&self) -> CreditType {
        match self {
            Self::Gs => CreditType::Gs,
            Self::Specialized => CreditType::Specialized,
        }
    }
}

/// A subject answers are submitted under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject id.
    pub id: SubjectId,
    /// Display name.
    pub name: String,
    /// Paper category.
    pub category: SubjectCategory,
    /// Hidden subjects are not offered for submission.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// Name-only projection embedded in joined answer rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Display name of the joined row.
    #[serde(alias = "full_name")]
    pub name: Option<String>,
}

/// An answer sheet row mirrored from the `answers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Answer id.
    pub id: AnswerId,
    /// Submitting student.
    pub student_id: UserId,
    /// Subject submitted under.
    pub subject_id: SubjectId,
    /// Evaluator, once assigned.
    #[serde(default)]
    pub assigned_faculty_id: Option<UserId>,
    /// Current status.
    pub status: AnswerStatus,
    /// The question being answered.
    #[serde(default)]
    pub question_text: Option<String>,
    /// Uploaded answer sheet.
    #[serde(default)]
    pub answer_file_url: Option<String>,
    /// Annotated sheet returned by the evaluator.
    #[serde(default)]
    pub evaluated_file_url: Option<String>,
    /// Upload size in bytes.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Approximate word count of the answer.
    #[serde(default)]
    pub word_count: Option<u32>,
    /// Marks awarded.
    #[serde(default)]
    pub marks_awarded: Option<f64>,
    /// Maximum marks for the question.
    #[serde(default)]
    pub max_marks: Option<f64>,
    /// Evaluator remarks.
    #[serde(default)]
    pub remarks: Option<String>,
    /// Evaluator's quality rating of the answer.
    #[serde(default)]
    pub rating: Option<u8>,
    /// When the student submitted.
    pub submitted_at: DateTime<Utc>,
    /// When an evaluator was assigned.
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    /// When evaluation finished.
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Last modification.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Joined subject name, when the query embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<NamedRef>,
    /// Joined student name, when the query embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<NamedRef>,
    /// Joined evaluator name, when the query embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<NamedRef>,
}

/// A student's submission before it is sent to `submit_answer`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSubmission {
    /// Subject to submit under.
    pub subject_id: SubjectId,
    /// The question being answered.
    pub question_text: String,
    /// URL of the already uploaded sheet.
    pub file_url: String,
    /// Upload size in bytes.
    pub file_size: u64,
    /// Approximate word count.
    pub word_count: u32,
}

impl AnswerSubmission {
    /// Check the upload against the size and type limits.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.question_text.trim().is_empty() {
            return Err(CoreError::Validation("Question text is required".into()));
        }
        if self.file_size == 0 {
            return Err(CoreError::Validation("Answer file is empty".into()));
        }
        if self.file_size > MAX_ANSWER_FILE_BYTES {
            return Err(CoreError::Validation(format!(
                "Answer file is too large ({} bytes, limit {MAX_ANSWER_FILE_BYTES})",
                self.file_size
            )));
        }
        let path = self.file_url.split(['?', '#']).next().unwrap_or_default();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_ANSWER_EXTENSIONS.contains(&extension.as_str()) {
            return Err(CoreError::Validation(format!(
                "Unsupported answer file type: {}",
                if extension.is_empty() { "none" } else { extension.as_str() }
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(url: &str, size: u64) -> AnswerSubmission {
        AnswerSubmission {
            subject_id: SubjectId::generate(),
            question_text: "Discuss federalism.".into(),
            file_url: url.into(),
            file_size: size,
            word_count: 250,
        }
    }

    #[test]
    fn evaluation_default_moves_assigned_forward() {
        assert_eq!(
            AnswerStatus::Assigned.evaluation_default(),
            AnswerStatus::InEvaluation
        );
        assert_eq!(
            AnswerStatus::Completed.evaluation_default(),
            AnswerStatus::Completed
        );
    }

    #[test]
    fn terminal_states() {
        assert!(AnswerStatus::Completed.is_terminal());
        assert!(AnswerStatus::Cancelled.is_terminal());
        assert!(!AnswerStatus::InEvaluation.is_terminal());
    }

    #[test]
    fn subject_category_maps_to_credit() {
        assert_eq!(SubjectCategory::Gs.credit_type(), CreditType::Gs);
        assert_eq!(
            SubjectCategory::Specialized.credit_type(),
            CreditType::Specialized
        );
    }

    #[test]
    fn submission_accepts_pdf_with_query_string() {
        let s = submission("https://cdn.example.com/a/sheet.PDF?token=abc", 2048);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn submission_rejects_oversized_file() {
        let s = submission("https://cdn.example.com/sheet.pdf", MAX_ANSWER_FILE_BYTES + 1);
        assert!(matches!(s.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn submission_rejects_unknown_type() {
        let err = submission("https://cdn.example.com/sheet.docx", 10)
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported answer file type: docx");
    }

    #[test]
    fn answer_decodes_joined_names() {
        let json = serde_json::json!({
            "id": AnswerId::generate().to_string(),
            "student_id": UserId::generate().to_string(),
            "subject_id": SubjectId::generate().to_string(),
            "status": "in_evaluation",
            "submitted_at": "2024-02-01T08:30:00Z",
            "subject": { "name": "GS Paper II" },
            "student": { "full_name": "Ravi" }
        });
        let answer: Answer = serde_json::from_value(json).unwrap();
        assert_eq!(answer.status, AnswerStatus::InEvaluation);
        assert_eq!(answer.student.unwrap().name.as_deref(), Some("Ravi"));
    }
}
