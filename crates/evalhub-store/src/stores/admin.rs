//! Platform-wide views and administrative actions.
//!
//! Per-entity actions use keyed loading flags (`plan_sync_{id}`,
//! `session_{id}`, `user_{id}`, ...) so a table can show a spinner on one
//! row while others stay usable.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;

use evalhub_client::rpc::{
    AdjustCreditsParams, AdminDashboardParams, AssignAnswerParams, ReplyTicketParams,
};
use evalhub_client::{Backend, BackendExt, ClientError, Direction, NewIdentity, Query};
use evalhub_core::{
    AdminDashboardStats, Answer, AnswerId, AnswerStatus, ArticleDraft, ArticleId,
    CreditTransaction, CreditType, HelpArticle, MentorshipSession, MentorshipStatus,
    NotificationTemplate, Order, Plan, PlanDraft, PlanId, Profile, RevenueSummary, Role, SessionId,
    SessionUpdate, SupportTicket, TemplateDraft, TemplateId, TicketId, TicketStatus, UserId,
};

use crate::cache::{lock, CacheEnv, FetchOptions, Slice, StoreStatus};
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::hooks::Confirm;
use crate::stores::identity::IdentityStore;
use crate::stores::{call_procedure, log_refresh, select_rows, transition_patch};

/// Ledger rows shown in the credit log.
const CREDIT_LOG_LIMIT: usize = 200;

/// Answers loaded under one status filter.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerPage {
    /// Filter the rows were loaded with; `None` means all statuses.
    pub filter: Option<AnswerStatus>,
    /// Newest first.
    pub rows: Vec<Answer>,
}

/// Everything the user detail page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDetail {
    /// Profile row.
    pub profile: Profile,
    /// Answers the user submitted.
    pub answers: Vec<Answer>,
    /// The user's ledger.
    pub credit_transactions: Vec<CreditTransaction>,
    /// Sessions the user booked.
    pub mentorship_sessions: Vec<MentorshipSession>,
}

/// Input for creating an account on someone's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Sign-in email.
    pub email: String,
    /// Initial password.
    pub password: String,
    /// Display name.
    pub full_name: String,
    /// Role to give the profile.
    pub role: Role,
}

/// Admin cache and actions.
pub struct AdminStore {
    backend: Arc<dyn Backend>,
    identity: Arc<IdentityStore>,
    confirm: Arc<dyn Confirm>,
    env: CacheEnv,
    dashboard: Slice<AdminDashboardStats>,
    students: Slice<Vec<Profile>>,
    faculty: Slice<Vec<Profile>>,
    answers: Mutex<HashMap<Option<AnswerStatus>, Slice<AnswerPage>>>,
    answers_filter: Mutex<Option<AnswerStatus>>,
    plans: Slice<Vec<Plan>>,
    orders: Slice<Vec<Order>>,
    credit_logs: Slice<Vec<CreditTransaction>>,
    mentorship_sessions: Slice<Vec<MentorshipSession>>,
    notification_templates: Slice<Vec<NotificationTemplate>>,
    help_articles: Slice<Vec<HelpArticle>>,
    support_tickets: Slice<Vec<SupportTicket>>,
}

impl std::fmt::Debug for AdminStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminStore")
            .field("status", self.env.status())
            .finish_non_exhaustive()
    }
}

impl AdminStore {
    /// Build the store. `confirm` is asked before destructive actions.
    #[must_use]
    pub fn new(
        ctx: &StoreContext,
        identity: Arc<IdentityStore>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        let signed_in = Arc::clone(&identity);
        let env = ctx.cache_env().owned_by(move || signed_in.user_id());
        Self {
            backend: Arc::clone(&ctx.backend),
            identity,
            confirm,
            dashboard: env.slice("dashboard"),
            students: env.slice("students"),
            faculty: env.slice("faculty"),
            answers: Mutex::default(),
            answers_filter: Mutex::default(),
            plans: env.slice("plans"),
            orders: env.slice("orders"),
            credit_logs: env.slice("credit_logs"),
            mentorship_sessions: env.slice("mentorship_sessions"),
            notification_templates: env.slice("notification_templates"),
            help_articles: env.slice("help_articles"),
            support_tickets: env.slice("support_tickets"),
            env,
        }
    }

    /// Loading flags and last error.
    #[must_use]
    pub fn status(&self) -> &Arc<StoreStatus> {
        self.env.status()
    }

    /// Platform counters.
    #[must_use]
    pub const fn dashboard(&self) -> &Slice<AdminDashboardStats> {
        &self.dashboard
    }

    /// Student profiles.
    #[must_use]
    pub const fn students(&self) -> &Slice<Vec<Profile>> {
        &self.students
    }

    /// Faculty profiles.
    #[must_use]
    pub const fn faculty(&self) -> &Slice<Vec<Profile>> {
        &self.faculty
    }

    /// Answers under the last requested filter.
    #[must_use]
    pub fn answers(&self) -> Slice<AnswerPage> {
        let filter = *lock(&self.answers_filter);
        self.answer_slice(filter)
    }

    /// Each filter caches separately, under loading key `answers` or
    /// `answers_{status}`.
    fn answer_slice(&self, filter: Option<AnswerStatus>) -> Slice<AnswerPage> {
        lock(&self.answers)
            .entry(filter)
            .or_insert_with(|| {
                self.env.slice(filter.map_or_else(
                    || "answers".to_string(),
                    |status| format!("answers_{}", status.as_str()),
                ))
            })
            .clone()
    }

    /// All plans, including inactive ones.
    #[must_use]
    pub const fn plans(&self) -> &Slice<Vec<Plan>> {
        &self.plans
    }

    /// All orders.
    #[must_use]
    pub const fn orders(&self) -> &Slice<Vec<Order>> {
        &self.orders
    }

    /// Recent credit ledger rows.
    #[must_use]
    pub const fn credit_logs(&self) -> &Slice<Vec<CreditTransaction>> {
        &self.credit_logs
    }

    /// All mentorship sessions.
    #[must_use]
    pub const fn mentorship_sessions(&self) -> &Slice<Vec<MentorshipSession>> {
        &self.mentorship_sessions
    }

    /// Notification templates.
    #[must_use]
    pub const fn notification_templates(&self) -> &Slice<Vec<NotificationTemplate>> {
        &self.notification_templates
    }

    /// All help articles, drafts included.
    #[must_use]
    pub const fn help_articles(&self) -> &Slice<Vec<HelpArticle>> {
        &self.help_articles
    }

    /// All support tickets.
    #[must_use]
    pub const fn support_tickets(&self) -> &Slice<Vec<SupportTicket>> {
        &self.support_tickets
    }

    /// Drop every cached slice.
    pub fn clear(&self) {
        self.dashboard.clear();
        self.students.clear();
        self.faculty.clear();
        for page in lock(&self.answers).values() {
            page.clear();
        }
        self.plans.clear();
        self.orders.clear();
        self.credit_logs.clear();
        self.mentorship_sessions.clear();
        self.notification_templates.clear();
        self.help_articles.clear();
        self.support_tickets.clear();
    }

    fn now(&self) -> DateTime<Utc> {
        self.env.clock().now()
    }

    // =========================================================================
    // Fetches
    // =========================================================================

    /// Load platform counters.
    ///
    /// # Errors
    ///
    /// Returns the procedure's error.
    pub async fn fetch_dashboard_stats(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<AdminDashboardStats>> {
        self.dashboard
            .fetch(options, || {
                call_procedure(&self.backend, AdminDashboardParams {})
            })
            .await
    }

    fn profiles_query(role: Role) -> Query {
        Query::table("profiles")
            .eq("role", role.as_str())
            .order_desc("created_at")
    }

    /// Load student profiles.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_students(&self, options: FetchOptions) -> Result<Arc<Vec<Profile>>> {
        let query = Self::profiles_query(Role::Student);
        self.students
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load faculty profiles.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_faculty(&self, options: FetchOptions) -> Result<Arc<Vec<Profile>>> {
        let query = Self::profiles_query(Role::Faculty);
        self.faculty
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load answers, optionally only one status. Every filter has its own
    /// cache entry and TTL.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_answers(
        &self,
        filter: Option<AnswerStatus>,
        options: FetchOptions,
    ) -> Result<Arc<AnswerPage>> {
        *lock(&self.answers_filter) = filter;
        let page = self.answer_slice(filter);
        let mut query = Query::table("answers")
            .select(
                "*, subject:subjects(name), student:profiles!student_id(full_name), \
                 faculty:profiles!assigned_faculty_id(full_name)",
            )
            .order_desc("submitted_at");
        if let Some(status) = filter {
            query = query.eq("status", status.as_str());
        }
        page.fetch(options, || {
            let rows = select_rows::<Answer>(&self.backend, query);
            async move {
                Ok(AnswerPage {
                    filter,
                    rows: rows.await?,
                })
            }
        })
        .await
    }

    /// Load every plan.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_plans(&self, options: FetchOptions) -> Result<Arc<Vec<Plan>>> {
        let query = Query::table("plans").order_desc("created_at");
        self.plans
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load every order with buyer and plan names.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_orders(&self, options: FetchOptions) -> Result<Arc<Vec<Order>>> {
        let query = Query::table("orders")
            .select("*, user:profiles!user_id(full_name), plan:plans(name)")
            .order_desc("created_at");
        self.orders
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the latest ledger rows.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_credit_logs(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<CreditTransaction>>> {
        let query = Query::table("credit_transactions")
            .select("*, user:profiles!user_id(full_name)")
            .order_desc("created_at")
            .limit(CREDIT_LOG_LIMIT);
        self.credit_logs
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load every session with student and mentor names.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_mentorship_sessions(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<MentorshipSession>>> {
        let query = Query::table("mentorship_sessions")
            .select(
                "*, student:profiles!student_id(full_name), mentor:profiles!mentor_id(full_name)",
            )
            .order_desc("created_at");
        self.mentorship_sessions
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load notification templates.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_notification_templates(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<NotificationTemplate>>> {
        let query = Query::table("notification_templates").order("name", Direction::Ascending);
        self.notification_templates
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load every help article.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_help_articles(&self, options: FetchOptions) -> Result<Arc<Vec<HelpArticle>>> {
        let query = Query::table("help_content").order("sort_order", Direction::Ascending);
        self.help_articles
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load every support ticket.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_support_tickets(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<SupportTicket>>> {
        let query = Query::table("support_tickets")
            .select("*, user:profiles!user_id(full_name)")
            .order_desc("created_at");
        self.support_tickets
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    // =========================================================================
    // Per-entity reads
    // =========================================================================

    /// One answer with all joined names.
    ///
    /// # Errors
    ///
    /// Returns the backend error, `NotFound` if there is no such answer.
    pub async fn fetch_answer_detail(&self, answer_id: AnswerId) -> Result<Answer> {
        self.env
            .track(format!("answer_{answer_id}"), async {
                let answer = self
                    .backend
                    .select_maybe(
                        &Query::table("answers")
                            .select(
                                "*, subject:subjects(name), student:profiles!student_id(full_name), \
                                 faculty:profiles!assigned_faculty_id(full_name)",
                            )
                            .eq("id", answer_id),
                    )
                    .await?;
                answer.ok_or_else(|| StoreError::NotFound("Answer".into()))
            })
            .await
    }

    /// A user's profile with their answers, ledger and sessions.
    ///
    /// # Errors
    ///
    /// Returns the backend error, `NotFound` if there is no such user.
    pub async fn fetch_user_detail(&self, user_id: UserId) -> Result<UserDetail> {
        self.env
            .track(format!("user_{user_id}"), async {
                let profile_query = Query::table("profiles").eq("id", user_id);
                let answers_query = Query::table("answers")
                    .select("*, subject:subjects(name)")
                    .eq("student_id", user_id)
                    .order_desc("submitted_at");
                let ledger_query = Query::table("credit_transactions")
                    .eq("user_id", user_id)
                    .order_desc("created_at");
                let sessions_query = Query::table("mentorship_sessions")
                    .eq("student_id", user_id)
                    .order_desc("created_at");
                let profile = self.backend.select_maybe::<Profile>(&profile_query);
                let answers = self.backend.select_as::<Answer>(&answers_query);
                let transactions = self.backend.select_as::<CreditTransaction>(&ledger_query);
                let sessions = self.backend.select_as::<MentorshipSession>(&sessions_query);
                let (profile, answers, credit_transactions, mentorship_sessions) =
                    futures::try_join!(profile, answers, transactions, sessions)?;
                Ok(UserDetail {
                    profile: profile.ok_or_else(|| StoreError::NotFound("User".into()))?,
                    answers,
                    credit_transactions,
                    mentorship_sessions,
                })
            })
            .await
    }

    /// Open assignments per evaluator, for picking who to reassign to.
    /// Evaluators with nothing open are listed with zero when the faculty
    /// slice is loaded.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_faculty_workload(&self) -> Result<BTreeMap<UserId, usize>> {
        self.env
            .track("faculty_workload", async {
                let open: Vec<Answer> = self
                    .backend
                    .select_as(
                        &Query::table("answers")
                            .select("id, assigned_faculty_id, status, student_id, subject_id, submitted_at")
                            .is_in(
                                "status",
                                [
                                    AnswerStatus::Assigned.as_str(),
                                    AnswerStatus::InEvaluation.as_str(),
                                ],
                            )
                            .not_null("assigned_faculty_id"),
                    )
                    .await?;
                let mut workload: BTreeMap<UserId, usize> = self
                    .faculty
                    .data()
                    .map(|all| all.iter().map(|p| (p.id, 0)).collect())
                    .unwrap_or_default();
                for faculty_id in open.iter().filter_map(|a| a.assigned_faculty_id) {
                    *workload.entry(faculty_id).or_default() += 1;
                }
                Ok(workload)
            })
            .await
    }

    /// Revenue totals derived from the cached orders.
    #[must_use]
    pub fn revenue_summary(&self) -> Option<RevenueSummary> {
        self.orders
            .data()
            .map(|orders| RevenueSummary::from_orders(&orders))
    }

    // =========================================================================
    // Users and credits
    // =========================================================================

    async fn refresh_role(&self, role: Role) {
        match role {
            Role::Student => log_refresh("students", self.fetch_students(FetchOptions::FORCE).await),
            Role::Faculty => log_refresh("faculty", self.fetch_faculty(FetchOptions::FORCE).await),
            Role::Admin => {}
        }
    }

    /// Create an identity, then fill in its profile row.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing fields, or the backend error
    /// of either step.
    pub async fn create_user(&self, user: &NewUser) -> Result<Profile> {
        let profile = self
            .env
            .track("create_user", async {
                if user.email.trim().is_empty() || user.password.is_empty() {
                    return Err(StoreError::Validation(
                        "Email and password are required".into(),
                    ));
                }
                let identity = self
                    .backend
                    .admin_create_user(&NewIdentity {
                        email: user.email.trim().to_string(),
                        password: user.password.clone(),
                        email_confirm: true,
                        user_metadata: json!({
                            "full_name": user.full_name,
                            "role": user.role,
                        }),
                    })
                    .await?;
                let rows: Vec<Profile> = self
                    .backend
                    .update_as(
                        &Query::table("profiles").eq("id", identity.id),
                        json!({
                            "full_name": user.full_name,
                            "role": user.role,
                            "email": user.email.trim(),
                        }),
                    )
                    .await?;
                let profile = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound("Profile".into()))?;
                tracing::info!(user_id = %profile.id, role = profile.role.as_str(), "User created");
                Ok(profile)
            })
            .await?;
        self.env.succeed("User created successfully");
        self.refresh_role(profile.role).await;
        Ok(profile)
    }

    /// Delete a user after confirmation. The profile row cascades.
    ///
    /// Returns `false` when the prompt was declined.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        if !self
            .confirm
            .confirm("Are you sure you want to delete this user? This cannot be undone.")
        {
            tracing::debug!(user_id = %user_id, "User deletion declined");
            return Ok(false);
        }
        self.env
            .track(format!("user_{user_id}"), async {
                self.backend.admin_delete_user(user_id).await?;
                tracing::info!(user_id = %user_id, "User deleted");
                Ok(())
            })
            .await?;
        self.env.succeed("User deleted");

        let (students, faculty) = futures::join!(
            self.fetch_students(FetchOptions::FORCE),
            self.fetch_faculty(FetchOptions::FORCE)
        );
        log_refresh("students", students);
        log_refresh("faculty", faculty);
        Ok(true)
    }

    /// Give an answer to another evaluator.
    ///
    /// # Errors
    ///
    /// Returns the procedure's error.
    pub async fn reassign_answer(&self, answer_id: AnswerId, faculty_id: UserId) -> Result<()> {
        self.env
            .track(format!("answer_{answer_id}"), async {
                self.backend
                    .call(&AssignAnswerParams {
                        p_answer_id: answer_id,
                        p_faculty_id: faculty_id,
                    })
                    .await?;
                tracing::info!(answer_id = %answer_id, faculty_id = %faculty_id, "Answer reassigned");
                Ok(())
            })
            .await?;
        self.env.succeed("Answer reassigned");

        let filter = *lock(&self.answers_filter);
        log_refresh(
            "answers",
            self.fetch_answers(filter, FetchOptions::FORCE).await,
        );
        Ok(())
    }

    /// Add or remove credits. `amount` is signed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero amount or empty reason, or the
    /// procedure's error.
    pub async fn adjust_user_credits(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
        reason: &str,
    ) -> Result<()> {
        self.env
            .track(format!("credits_{user_id}"), async {
                if amount == 0 {
                    return Err(StoreError::Validation("Amount cannot be zero".into()));
                }
                if reason.trim().is_empty() {
                    return Err(StoreError::Validation("A reason is required".into()));
                }
                self.backend
                    .call(&AdjustCreditsParams {
                        p_user_id: user_id,
                        p_credit_type: credit_type,
                        p_amount: amount,
                        p_reason: reason.trim().to_string(),
                    })
                    .await?;
                tracing::info!(
                    user_id = %user_id,
                    credit_type = credit_type.as_str(),
                    amount,
                    "Credits adjusted"
                );
                Ok(())
            })
            .await?;
        self.env.succeed("Credits updated");

        let (logs, students) = futures::join!(
            self.fetch_credit_logs(FetchOptions::FORCE),
            self.fetch_students(FetchOptions::FORCE)
        );
        log_refresh("credit_logs", logs);
        log_refresh("students", students);
        if self.identity.user_id() == Some(user_id) {
            log_refresh("profile", self.identity.refresh_profile().await);
        }
        Ok(())
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Create a plan.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad draft, or the backend error.
    pub async fn create_plan(&self, draft: &PlanDraft) -> Result<Plan> {
        let plan = self
            .env
            .track("create_plan", async {
                draft.validate()?;
                let row = serde_json::to_value(draft).map_err(ClientError::from)?;
                let plan: Plan = self.backend.insert_as("plans", row).await?;
                tracing::info!(plan_id = %plan.id, "Plan created");
                Ok(plan)
            })
            .await?;
        self.env.succeed("Plan created");
        log_refresh("plans", self.fetch_plans(FetchOptions::FORCE).await);
        Ok(plan)
    }

    async fn patch_plan(&self, plan_id: PlanId, patch: serde_json::Value) -> Result<Plan> {
        self.env
            .track(format!("plan_sync_{plan_id}"), async {
                let rows: Vec<Plan> = self
                    .backend
                    .update_as(&Query::table("plans").eq("id", plan_id), patch)
                    .await?;
                let plan = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound("Plan".into()))?;
                tracing::info!(plan_id = %plan_id, "Plan updated");
                Ok(plan)
            })
            .await
    }

    /// Overwrite a plan's editable fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad draft, or the backend error.
    pub async fn update_plan(&self, plan_id: PlanId, draft: &PlanDraft) -> Result<Plan> {
        if let Err(err) = draft.validate() {
            let err = StoreError::from(err);
            self.env.fail(&err);
            return Err(err);
        }
        let mut patch = serde_json::to_value(draft).map_err(ClientError::from)?;
        if let Some(fields) = patch.as_object_mut() {
            fields.insert("updated_at".into(), json!(self.now()));
        }
        let plan = self.patch_plan(plan_id, patch).await?;
        self.env.succeed("Plan updated");
        log_refresh("plans", self.fetch_plans(FetchOptions::FORCE).await);
        Ok(plan)
    }

    /// Put a plan on or off sale. Plans are never deleted.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn set_plan_active(&self, plan_id: PlanId, active: bool) -> Result<Plan> {
        let plan = self
            .patch_plan(
                plan_id,
                json!({ "is_active": active, "updated_at": self.now() }),
            )
            .await?;
        self.env
            .succeed(if active { "Plan activated" } else { "Plan deactivated" });
        log_refresh("plans", self.fetch_plans(FetchOptions::FORCE).await);
        Ok(plan)
    }

    // =========================================================================
    // Notification templates
    // =========================================================================

    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name, or the backend error.
    pub async fn create_template(&self, draft: &TemplateDraft) -> Result<NotificationTemplate> {
        let template = self
            .env
            .track("create_template", async {
                if draft.name.trim().is_empty() {
                    return Err(StoreError::Validation("Template name is required".into()));
                }
                let row = serde_json::to_value(draft).map_err(ClientError::from)?;
                let template: NotificationTemplate =
                    self.backend.insert_as("notification_templates", row).await?;
                Ok(template)
            })
            .await?;
        self.env.succeed("Template created");
        log_refresh(
            "notification_templates",
            self.fetch_notification_templates(FetchOptions::FORCE).await,
        );
        Ok(template)
    }

    /// Overwrite a template.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn update_template(
        &self,
        template_id: TemplateId,
        draft: &TemplateDraft,
    ) -> Result<NotificationTemplate> {
        let template = self
            .env
            .track(format!("template_{template_id}"), async {
                let patch = serde_json::to_value(draft).map_err(ClientError::from)?;
                let rows: Vec<NotificationTemplate> = self
                    .backend
                    .update_as(
                        &Query::table("notification_templates").eq("id", template_id),
                        patch,
                    )
                    .await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound("Template".into()))
            })
            .await?;
        self.env.succeed("Template updated");
        log_refresh(
            "notification_templates",
            self.fetch_notification_templates(FetchOptions::FORCE).await,
        );
        Ok(template)
    }

    /// Delete a template after confirmation. Returns `false` when declined.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn delete_template(&self, template_id: TemplateId) -> Result<bool> {
        if !self.confirm.confirm("Delete this notification template?") {
            return Ok(false);
        }
        self.env
            .track(format!("template_{template_id}"), async {
                self.backend
                    .delete(&Query::table("notification_templates").eq("id", template_id))
                    .await?;
                Ok(())
            })
            .await?;
        self.env.succeed("Template deleted");
        log_refresh(
            "notification_templates",
            self.fetch_notification_templates(FetchOptions::FORCE).await,
        );
        Ok(true)
    }

    // =========================================================================
    // Mentorship
    // =========================================================================

    async fn session_status(&self, session_id: SessionId) -> Result<MentorshipStatus> {
        let cached = self
            .mentorship_sessions
            .data()
            .and_then(|all| all.iter().find(|s| s.id == session_id).map(|s| s.status));
        match cached {
            Some(status) => Ok(status),
            None => Ok(self
                .backend
                .select_one::<MentorshipSession>(
                    &Query::table("mentorship_sessions").eq("id", session_id),
                )
                .await?
                .status),
        }
    }

    /// Apply a partial update to any session, guarded on its previous
    /// status.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the status changed since it was read, or the
    /// backend error.
    pub async fn update_mentorship_session(
        &self,
        session_id: SessionId,
        update: &SessionUpdate,
    ) -> Result<MentorshipSession> {
        let outcome = self
            .env
            .track(format!("session_{session_id}"), async {
                let previous = self.session_status(session_id).await?;
                let patch = transition_patch(update, previous, self.now())?;
                let rows: Vec<MentorshipSession> = self
                    .backend
                    .update_as(
                        &Query::table("mentorship_sessions")
                            .eq("id", session_id)
                            .eq("status", previous.as_str()),
                        patch,
                    )
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
                    "Mentorship session updated by admin"
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

    /// Cancel a session with a reason.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a session already over, `Conflict` on
    /// a racing edit, or the backend error.
    pub async fn cancel_mentorship_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<MentorshipSession> {
        if let Ok(status) = self.session_status(session_id).await {
            if status.is_terminal() {
                let err = StoreError::Validation(format!(
                    "A {} session cannot be cancelled",
                    status.as_str()
                ));
                self.env.fail(&err);
                return Err(err);
            }
        }
        self.update_mentorship_session(
            session_id,
            &SessionUpdate {
                status: Some(MentorshipStatus::Cancelled),
                cancellation_reason: Some(reason.trim().to_string()).filter(|r| !r.is_empty()),
                ..SessionUpdate::default()
            },
        )
        .await
    }

    // =========================================================================
    // Help and support
    // =========================================================================

    /// Publish or draft a help article.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty title or body, or the backend
    /// error.
    pub async fn create_help_article(&self, draft: &ArticleDraft) -> Result<HelpArticle> {
        let article = self
            .env
            .track("create_article", async {
                if draft.title.trim().is_empty() || draft.content.trim().is_empty() {
                    return Err(StoreError::Validation(
                        "Title and content are required".into(),
                    ));
                }
                let row = serde_json::to_value(draft).map_err(ClientError::from)?;
                let article: HelpArticle = self.backend.insert_as("help_content", row).await?;
                Ok(article)
            })
            .await?;
        self.env.succeed("Article saved");
        log_refresh(
            "help_articles",
            self.fetch_help_articles(FetchOptions::FORCE).await,
        );
        Ok(article)
    }

    /// Overwrite a help article.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn update_help_article(
        &self,
        article_id: ArticleId,
        draft: &ArticleDraft,
    ) -> Result<HelpArticle> {
        let article = self
            .env
            .track(format!("article_{article_id}"), async {
                let patch = serde_json::to_value(draft).map_err(ClientError::from)?;
                let rows: Vec<HelpArticle> = self
                    .backend
                    .update_as(&Query::table("help_content").eq("id", article_id), patch)
                    .await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound("Article".into()))
            })
            .await?;
        self.env.succeed("Article saved");
        log_refresh(
            "help_articles",
            self.fetch_help_articles(FetchOptions::FORCE).await,
        );
        Ok(article)
    }

    /// Delete a help article after confirmation. Returns `false` when
    /// declined.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn delete_help_article(&self, article_id: ArticleId) -> Result<bool> {
        if !self.confirm.confirm("Delete this help article?") {
            return Ok(false);
        }
        self.env
            .track(format!("article_{article_id}"), async {
                self.backend
                    .delete(&Query::table("help_content").eq("id", article_id))
                    .await?;
                Ok(())
            })
            .await?;
        self.env.succeed("Article deleted");
        log_refresh(
            "help_articles",
            self.fetch_help_articles(FetchOptions::FORCE).await,
        );
        Ok(true)
    }

    /// Move a ticket to another status.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn update_ticket_status(&self, ticket_id: TicketId, status: TicketStatus) -> Result<()> {
        self.env
            .track(format!("ticket_{ticket_id}"), async {
                let rows = self
                    .backend
                    .update(
                        &Query::table("support_tickets").eq("id", ticket_id),
                        json!({ "status": status, "updated_at": self.now() }),
                    )
                    .await?;
                if rows.is_empty() {
                    return Err(StoreError::NotFound("Ticket".into()));
                }
                Ok(())
            })
            .await?;
        self.env.succeed("Ticket updated");
        log_refresh(
            "support_tickets",
            self.fetch_support_tickets(FetchOptions::FORCE).await,
        );
        Ok(())
    }

    /// Reply on a ticket as staff.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty message, or the procedure's
    /// error.
    pub async fn reply_to_ticket(&self, ticket_id: TicketId, message: &str) -> Result<()> {
        self.env
            .track(format!("ticket_{ticket_id}"), async {
                if message.trim().is_empty() {
                    return Err(StoreError::Validation("Message cannot be empty".into()));
                }
                self.backend
                    .call(&ReplyTicketParams {
                        p_ticket_id: ticket_id,
                        p_message: message.trim().to_string(),
                    })
                    .await?;
                Ok(())
            })
            .await?;
        self.env.succeed("Reply sent");
        log_refresh(
            "support_tickets",
            self.fetch_support_tickets(FetchOptions::FORCE).await,
        );
        Ok(())
    }
}
