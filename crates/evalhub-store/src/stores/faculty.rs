//! A faculty member's assigned answers and mentorship sessions.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::json;

use evalhub_client::rpc::EvaluateAnswerParams;
use evalhub_client::{Backend, BackendExt, Direction, Query};
use evalhub_core::{
    Answer, AnswerId, AnswerStatus, MentorshipSession, Profile, ProfileUpdate, SessionId,
    SessionUpdate, UserId,
};

use crate::cache::{CacheEnv, FetchOptions, Slice, StoreStatus};
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::stores::identity::IdentityStore;
use crate::stores::{log_refresh, select_rows, transition_patch};

/// Marks and remarks for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Answer being evaluated.
    pub answer_id: AnswerId,
    /// Marks awarded; may not exceed `max_marks`.
    pub marks_awarded: f64,
    /// Maximum marks.
    pub max_marks: f64,
    /// Remarks for the student.
    pub remarks: String,
    /// Status to record, usually `completed`.
    pub status: AnswerStatus,
    /// Optional quality rating.
    pub rating: Option<u8>,
    /// Annotated sheet, if uploaded.
    pub evaluated_file_url: Option<String>,
}

/// Faculty-facing cache and actions.
pub struct FacultyStore {
    backend: Arc<dyn Backend>,
    identity: Arc<IdentityStore>,
    env: CacheEnv,
    assigned_answers: Slice<Vec<Answer>>,
    mentorship_sessions: Slice<Vec<MentorshipSession>>,
}

impl std::fmt::Debug for FacultyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacultyStore")
            .field("status", self.env.status())
            .field("assigned_answers", &self.assigned_answers)
            .field("mentorship_sessions", &self.mentorship_sessions)
            .finish_non_exhaustive()
    }
}

impl FacultyStore {
    /// Build the store.
    #[must_use]
    pub fn new(ctx: &StoreContext, identity: Arc<IdentityStore>) -> Self {
        let signed_in = Arc::clone(&identity);
        let env = ctx.cache_env().owned_by(move || signed_in.user_id());
        Self {
            backend: Arc::clone(&ctx.backend),
            identity,
            assigned_answers: env.slice("assigned_answers"),
            mentorship_sessions: env.slice("mentorship_sessions"),
            env,
        }
    }

    /// Loading flags and last error.
    #[must_use]
    pub fn status(&self) -> &Arc<StoreStatus> {
        self.env.status()
    }

    /// Answers assigned to this evaluator.
    #[must_use]
    pub const fn assigned_answers(&self) -> &Slice<Vec<Answer>> {
        &self.assigned_answers
    }

    /// Sessions this mentor runs.
    #[must_use]
    pub const fn mentorship_sessions(&self) -> &Slice<Vec<MentorshipSession>> {
        &self.mentorship_sessions
    }

    /// Drop every cached slice.
    pub fn clear(&self) {
        self.assigned_answers.clear();
        self.mentorship_sessions.clear();
    }

    fn user_id(&self) -> Result<UserId> {
        self.identity.require_user_id()
    }

    /// Load assigned answers with subject and student names.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_assigned_answers(&self, options: FetchOptions) -> Result<Arc<Vec<Answer>>> {
        let query = Query::table("answers")
            .select("*, subject:subjects(name), student:profiles!student_id(full_name)")
            .eq("assigned_faculty_id", self.user_id()?)
            .order_desc("assigned_at");
        self.assigned_answers
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load this mentor's sessions, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_mentorship_sessions(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<MentorshipSession>>> {
        let query = Query::table("mentorship_sessions")
            .select("*, student:profiles!student_id(full_name)")
            .eq("mentor_id", self.user_id()?)
            .order("scheduled_at", Direction::Ascending);
        self.mentorship_sessions
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Record an evaluation.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the marks exceed the maximum (no
    /// call is made), or the procedure's error.
    pub async fn evaluate_answer(&self, evaluation: Evaluation) -> Result<()> {
        let answer_id = evaluation.answer_id;
        self.env
            .track(format!("answer_{answer_id}"), async {
                self.user_id()?;
                let within = matches!(
                    evaluation.marks_awarded.partial_cmp(&evaluation.max_marks),
                    Some(Ordering::Less | Ordering::Equal)
                );
                if !within {
                    return Err(StoreError::Validation(
                        "Marks awarded cannot exceed maximum marks".into(),
                    ));
                }
                self.backend
                    .call(&EvaluateAnswerParams {
                        p_answer_id: answer_id,
                        p_marks_awarded: evaluation.marks_awarded,
                        p_max_marks: evaluation.max_marks,
                        p_remarks: evaluation.remarks,
                        p_status: evaluation.status,
                        p_rating: evaluation.rating,
                        p_evaluated_file_url: evaluation.evaluated_file_url,
                    })
                    .await?;
                tracing::info!(answer_id = %answer_id, "Answer evaluated");
                Ok(())
            })
            .await?;
        self.env.succeed("Evaluation submitted successfully");

        log_refresh(
            "assigned_answers",
            self.fetch_assigned_answers(FetchOptions::FORCE).await,
        );
        Ok(())
    }

    /// Move an assigned answer into evaluation. Returns the resulting
    /// status; answers in any other state are left alone.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the answer changed since it was read, or the
    /// backend error.
    pub async fn start_evaluation(&self, answer_id: AnswerId) -> Result<AnswerStatus> {
        let (status, changed) = self
            .env
            .track(format!("answer_{answer_id}"), async {
                let user_id = self.user_id()?;
                let base = Query::table("answers")
                    .eq("id", answer_id)
                    .eq("assigned_faculty_id", user_id);
                let cached = self
                    .assigned_answers
                    .data()
                    .and_then(|all| all.iter().find(|a| a.id == answer_id).map(|a| a.status));
                let current = match cached {
                    Some(status) => status,
                    None => self.backend.select_one::<Answer>(&base).await?.status,
                };
                let next = current.evaluation_default();
                if next == current {
                    return Ok((current, false));
                }
                let rows = self
                    .backend
                    .update(
                        &base.eq("status", current.as_str()),
                        json!({ "status": next }),
                    )
                    .await?;
                if rows.is_empty() {
                    return Err(StoreError::Conflict(
                        "This answer was updated elsewhere. Reload and try again.".into(),
                    ));
                }
                tracing::info!(answer_id = %answer_id, from = current.as_str(), to = next.as_str(), "Evaluation started");
                Ok((next, true))
            })
            .await?;

        if changed {
            log_refresh(
                "assigned_answers",
                self.fetch_assigned_answers(FetchOptions::FORCE).await,
            );
        }
        Ok(status)
    }

    /// Apply a partial update to one of this mentor's sessions.
    ///
    /// The write only lands if the session still has the status it had when
    /// read. Moving into `in_progress` stamps `started_at`; moving into
    /// `completed` stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when another edit changed the status first, or the
    /// backend error.
    pub async fn update_mentorship_session(
        &self,
        session_id: SessionId,
        update: SessionUpdate,
    ) -> Result<MentorshipSession> {
        let outcome = self
            .env
            .track(format!("session_{session_id}"), async {
                let user_id = self.user_id()?;
                let base = Query::table("mentorship_sessions")
                    .eq("id", session_id)
                    .eq("mentor_id", user_id);
                let cached = self.mentorship_sessions.data().and_then(|all| {
                    all.iter().find(|s| s.id == session_id).map(|s| s.status)
                });
                let previous = match cached {
                    Some(status) => status,
                    None => {
                        self.backend
                            .select_one::<MentorshipSession>(&base)
                            .await?
                            .status
                    }
                };

                let patch = transition_patch(&update, previous, self.env.clock().now())?;
                let rows: Vec<MentorshipSession> = self
                    .backend
                    .update_as(&base.eq("status", previous.as_str()), patch)
                    .await?;
                let session = rows.into_iter().next().ok_or_else(|| {
                    StoreError::Conflict(
                        "This session was updated elsewhere. Reload and try again.".into(),
                    )
                })?;
                tracing::info!(
                    session_id = %session_id,
                    from = previous.as_str(),
                    to = session.status.as_str(),
                    "Mentorship session updated"
                );
                Ok(session)
            })
            .await;
        let session = self.reload_on_conflict(outcome).await?;
        self.env.succeed("Session updated");

        log_refresh(
            "mentorship_sessions",
            self.fetch_mentorship_sessions(FetchOptions::FORCE).await,
        );
        Ok(session)
    }

    /// A conflict means the cached status is stale; reload before reporting.
    async fn reload_on_conflict<T>(&self, outcome: Result<T>) -> Result<T> {
        if let Err(StoreError::Conflict(_)) = &outcome {
            log_refresh(
                "mentorship_sessions",
                self.fetch_mentorship_sessions(FetchOptions::FORCE).await,
            );
        }
        outcome
    }

    /// Toggle whether this evaluator accepts new work.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn set_availability(&self, available: bool) -> Result<Profile> {
        self.identity
            .update_profile(&ProfileUpdate {
                is_available: Some(available),
                ..ProfileUpdate::default()
            })
            .await
    }

    /// Assigned answers not yet evaluated.
    #[must_use]
    pub fn open_assignments(&self) -> Vec<Answer> {
        self.assigned_answers
            .data()
            .map(|all| {
                all.iter()
                    .filter(|a| a.status.is_open_assignment())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
