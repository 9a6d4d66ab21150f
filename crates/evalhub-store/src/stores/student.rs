//! The student's view: plans, purchases, answers, mentorship and
//! notifications.
//!
//! Mutations call a procedure or a guarded table write and then force a
//! reload of the slices they touch. Credit-affecting mutations also refresh
//! the profile. Notification read-state is the one optimistic edit.

use std::sync::Arc;

use serde_json::json;

use evalhub_client::rpc::{
    CancelMentorshipParams, CreateTicketParams, ReplyTicketParams, RequestMentorshipParams,
    SubmitAnswerParams, UserDashboardParams,
};
use evalhub_client::{
    Backend, BackendExt, ClientError, CreateOrderResponse, CreateSubscriptionResponse, Direction,
    PaymentEndpoint, PaymentRequest, Query,
};
use evalhub_core::{
    Answer, AnswerId, AnswerSubmission, CreditType, HelpArticle, MentorshipSession,
    MentorshipStatus, NewTicket, Notification, NotificationId, Order, Plan, PlanId, PlanType,
    SessionFeedback, SessionId, Subject, SubjectId, Subscription, SubscriptionId,
    SupportTicket, SupportTicketMessage, TicketId, UserDashboard, UserId, DEFAULT_SESSION_MINUTES,
    MAX_RATING, MIN_RATING,
};

use crate::cache::{CacheEnv, FetchOptions, Slice, StoreStatus};
use crate::config::StoreConfig;
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::hooks::{CheckoutOutcome, CheckoutRequest, CheckoutTarget, CheckoutWidget};
use crate::stores::identity::IdentityStore;
use crate::stores::{call_procedure, log_refresh, select_rows};

/// Notifications with their unread count, replaced together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFeed {
    /// Newest first.
    pub items: Vec<Notification>,
    /// Items with `is_read == false`.
    pub unread: usize,
}

impl NotificationFeed {
    /// Build a feed, counting unread items.
    #[must_use]
    pub fn new(items: Vec<Notification>) -> Self {
        let unread = items.iter().filter(|n| !n.is_read).count();
        Self { items, unread }
    }

    fn with_read(&self, id: Option<NotificationId>, read: bool) -> Self {
        let mut next = self.clone();
        for item in &mut next.items {
            if id.map_or(true, |id| item.id == id) && item.is_read != read {
                item.is_read = read;
                if read {
                    next.unread = next.unread.saturating_sub(1);
                } else {
                    next.unread += 1;
                }
            }
        }
        next
    }
}

/// How a completed checkout ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The webhook's order or subscription row was seen.
    Settled {
        /// Gateway reference that was paid.
        reference: String,
    },
    /// Paid, but the webhook had not landed when polling stopped.
    Pending {
        /// Gateway reference that was paid.
        reference: String,
    },
}

/// Number of notifications loaded into the feed.
const NOTIFICATION_PAGE: usize = 50;

/// Student-facing cache and actions.
pub struct StudentStore {
    backend: Arc<dyn Backend>,
    identity: Arc<IdentityStore>,
    checkout: Arc<dyn CheckoutWidget>,
    env: CacheEnv,
    config: StoreConfig,
    payment_key: Option<String>,
    plans: Slice<Vec<Plan>>,
    subscriptions: Slice<Vec<Subscription>>,
    orders: Slice<Vec<Order>>,
    answers: Slice<Vec<Answer>>,
    mentorship_sessions: Slice<Vec<MentorshipSession>>,
    notifications: Slice<NotificationFeed>,
    subjects: Slice<Vec<Subject>>,
    dashboard: Slice<UserDashboard>,
}

impl std::fmt::Debug for StudentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudentStore")
            .field("status", self.env.status())
            .field("answers", &self.answers)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}

impl StudentStore {
    /// Build the store. `checkout` drives the payment modal.
    #[must_use]
    pub fn new(
        ctx: &StoreContext,
        identity: Arc<IdentityStore>,
        checkout: Arc<dyn CheckoutWidget>,
    ) -> Self {
        let signed_in = Arc::clone(&identity);
        let env = ctx.cache_env().owned_by(move || signed_in.user_id());
        Self {
            backend: Arc::clone(&ctx.backend),
            identity,
            checkout,
            config: ctx.config.clone(),
            payment_key: None,
            plans: env.slice("plans"),
            subscriptions: env.slice("subscriptions"),
            orders: env.slice("orders"),
            answers: env.slice("answers"),
            mentorship_sessions: env.slice("mentorship_sessions"),
            notifications: env.slice("notifications"),
            subjects: env.slice("subjects"),
            dashboard: env.slice("dashboard"),
            env,
        }
    }

    /// Checkout key used when the payment route does not return one.
    #[must_use]
    pub fn with_payment_key(mut self, key: impl Into<String>) -> Self {
        self.payment_key = Some(key.into());
        self
    }

    /// Loading flags and last error.
    #[must_use]
    pub fn status(&self) -> &Arc<StoreStatus> {
        self.env.status()
    }

    /// Active plans.
    #[must_use]
    pub const fn plans(&self) -> &Slice<Vec<Plan>> {
        &self.plans
    }

    /// The student's subscriptions.
    #[must_use]
    pub const fn subscriptions(&self) -> &Slice<Vec<Subscription>> {
        &self.subscriptions
    }

    /// The student's orders.
    #[must_use]
    pub const fn orders(&self) -> &Slice<Vec<Order>> {
        &self.orders
    }

    /// The student's answers.
    #[must_use]
    pub const fn answers(&self) -> &Slice<Vec<Answer>> {
        &self.answers
    }

    /// The student's mentorship sessions.
    #[must_use]
    pub const fn mentorship_sessions(&self) -> &Slice<Vec<MentorshipSession>> {
        &self.mentorship_sessions
    }

    /// The notification feed.
    #[must_use]
    pub const fn notifications(&self) -> &Slice<NotificationFeed> {
        &self.notifications
    }

    /// Active subjects.
    #[must_use]
    pub const fn subjects(&self) -> &Slice<Vec<Subject>> {
        &self.subjects
    }

    /// Dashboard counters.
    #[must_use]
    pub const fn dashboard(&self) -> &Slice<UserDashboard> {
        &self.dashboard
    }

    /// Unread notifications, zero before the first load.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.notifications.data().map_or(0, |feed| feed.unread)
    }

    /// Drop every cached slice.
    pub fn clear(&self) {
        self.plans.clear();
        self.subscriptions.clear();
        self.orders.clear();
        self.answers.clear();
        self.mentorship_sessions.clear();
        self.notifications.clear();
        self.subjects.clear();
        self.dashboard.clear();
    }

    fn user_id(&self) -> Result<UserId> {
        self.identity.require_user_id()
    }

    // =========================================================================
    // Fetches
    // =========================================================================

    /// Load active plans, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_plans(&self, options: FetchOptions) -> Result<Arc<Vec<Plan>>> {
        let query = Query::table("plans")
            .eq("is_active", true)
            .order("price", Direction::Ascending);
        self.plans
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the student's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_subscriptions(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<Subscription>>> {
        let query = Query::table("subscriptions")
            .select("*, plan:plans(name)")
            .eq("user_id", self.user_id()?)
            .order_desc("created_at");
        self.subscriptions
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the student's orders.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_user_orders(&self, options: FetchOptions) -> Result<Arc<Vec<Order>>> {
        let query = Query::table("orders")
            .select("*, plan:plans(name)")
            .eq("user_id", self.user_id()?)
            .order_desc("created_at");
        self.orders
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the student's answers with subject and evaluator names.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_user_answers(&self, options: FetchOptions) -> Result<Arc<Vec<Answer>>> {
        let query = Query::table("answers")
            .select("*, subject:subjects(name), faculty:profiles!assigned_faculty_id(full_name)")
            .eq("student_id", self.user_id()?)
            .order_desc("submitted_at");
        self.answers
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the student's mentorship sessions with mentor names.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_mentorship_sessions(
        &self,
        options: FetchOptions,
    ) -> Result<Arc<Vec<MentorshipSession>>> {
        let query = Query::table("mentorship_sessions")
            .select("*, mentor:profiles!mentor_id(full_name)")
            .eq("student_id", self.user_id()?)
            .order_desc("created_at");
        self.mentorship_sessions
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the latest notifications.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_notifications(&self, options: FetchOptions) -> Result<Arc<NotificationFeed>> {
        let query = Query::table("notifications")
            .eq("user_id", self.user_id()?)
            .order_desc("created_at")
            .limit(NOTIFICATION_PAGE);
        self.notifications
            .fetch(options, || {
                let rows = select_rows::<Notification>(&self.backend, query);
                async move { Ok(NotificationFeed::new(rows.await?)) }
            })
            .await
    }

    /// Load active subjects.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_subjects(&self, options: FetchOptions) -> Result<Arc<Vec<Subject>>> {
        let query = Query::table("subjects")
            .eq("is_active", true)
            .order("name", Direction::Ascending);
        self.subjects
            .fetch(options, || select_rows(&self.backend, query))
            .await
    }

    /// Load the dashboard counters.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_dashboard(&self, options: FetchOptions) -> Result<Arc<UserDashboard>> {
        let params = UserDashboardParams {
            p_user_id: self.user_id()?,
        };
        self.dashboard
            .fetch(options, || call_procedure(&self.backend, params))
            .await
    }

    // =========================================================================
    // Answers and mentorship
    // =========================================================================

    async fn subject(&self, subject_id: SubjectId) -> Result<Subject> {
        if let Some(subject) = self
            .subjects
            .data()
            .and_then(|all| all.iter().find(|s| s.id == subject_id).cloned())
        {
            return Ok(subject);
        }
        self.backend
            .select_maybe(&Query::table("subjects").eq("id", subject_id))
            .await?
            .ok_or_else(|| StoreError::NotFound("Subject".into()))
    }

    fn require_credit(&self, credit: CreditType) -> Result<()> {
        let profile = self.identity.profile().ok_or(StoreError::NotAuthenticated)?;
        let balance = profile.balance(credit);
        if balance < 1 {
            return Err(StoreError::InsufficientCredits {
                credit: credit.label(),
                balance,
                required: 1,
            });
        }
        Ok(())
    }

    /// Submit an answer sheet, spending one credit of the subject's type.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad upload or empty balance (no call
    /// is made), or the procedure's error.
    pub async fn submit_answer_sheet(&self, submission: &AnswerSubmission) -> Result<AnswerId> {
        let answer_id = self
            .env
            .track("submit_answer", async {
                self.user_id()?;
                submission.validate()?;
                let subject = self.subject(submission.subject_id).await?;
                self.require_credit(subject.category.credit_type())?;

                let answer_id = self
                    .backend
                    .call(&SubmitAnswerParams {
                        p_subject_id: submission.subject_id,
                        p_question_text: submission.question_text.clone(),
                        p_answer_file_url: submission.file_url.clone(),
                        p_file_size: submission.file_size,
                        p_word_count: submission.word_count,
                    })
                    .await?;
                tracing::info!(answer_id = %answer_id, subject_id = %submission.subject_id, "Answer submitted");
                Ok(answer_id)
            })
            .await?;
        self.env.succeed("Answer submitted successfully");

        let (answers, profile) = futures::join!(
            self.fetch_user_answers(FetchOptions::FORCE),
            self.identity.refresh_profile()
        );
        log_refresh("answers", answers);
        log_refresh("profile", profile);
        Ok(answer_id)
    }

    /// Request a mentorship session, spending one mentorship credit.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty notes or no mentorship credits
    /// (no call is made), or the procedure's error.
    pub async fn request_mentorship_session(
        &self,
        notes: &str,
        duration_minutes: Option<u32>,
    ) -> Result<SessionId> {
        let session_id = self
            .env
            .track("request_mentorship", async {
                self.user_id()?;
                if notes.trim().is_empty() {
                    return Err(StoreError::Validation(
                        "Describe what you would like to discuss".into(),
                    ));
                }
                self.require_credit(CreditType::Mentorship)?;

                let session_id = self
                    .backend
                    .call(&RequestMentorshipParams {
                        p_notes: notes.trim().to_string(),
                        p_duration_minutes: duration_minutes.unwrap_or(DEFAULT_SESSION_MINUTES),
                    })
                    .await?;
                tracing::info!(session_id = %session_id, "Mentorship requested");
                Ok(session_id)
            })
            .await?;
        self.env.succeed("Mentorship session requested successfully");

        let (sessions, notifications, profile) = futures::join!(
            self.fetch_mentorship_sessions(FetchOptions::FORCE),
            self.fetch_notifications(FetchOptions::FORCE),
            self.identity.refresh_profile()
        );
        log_refresh("mentorship_sessions", sessions);
        log_refresh("notifications", notifications);
        log_refresh("profile", profile);
        Ok(session_id)
    }

    fn cached_session(&self, session_id: SessionId) -> Option<MentorshipSession> {
        self.mentorship_sessions
            .data()
            .and_then(|all| all.iter().find(|s| s.id == session_id).cloned())
    }

    /// Cancel one of the student's sessions. The backend refunds the credit.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the cached session is already past
    /// the point of cancelling, or the procedure's error.
    pub async fn cancel_mentorship_session(
        &self,
        session_id: SessionId,
        reason: Option<String>,
    ) -> Result<()> {
        self.env
            .track(format!("session_{session_id}"), async {
                self.user_id()?;
                if let Some(session) = self.cached_session(session_id) {
                    if !session.status.is_cancellable_by_student() {
                        return Err(StoreError::Validation(format!(
                            "A {} session can no longer be cancelled",
                            session.status.as_str()
                        )));
                    }
                }
                self.backend
                    .call(&CancelMentorshipParams {
                        p_session_id: session_id,
                        p_reason: reason,
                    })
                    .await?;
                tracing::info!(session_id = %session_id, "Mentorship cancelled by student");
                Ok(())
            })
            .await?;
        self.env.succeed("Session cancelled");

        let (sessions, profile) = futures::join!(
            self.fetch_mentorship_sessions(FetchOptions::FORCE),
            self.identity.refresh_profile()
        );
        log_refresh("mentorship_sessions", sessions);
        log_refresh("profile", profile);
        Ok(())
    }

    /// Rate a completed session.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a rating outside 1..=5 or a session
    /// that is not completed (the rating is checked before any call), or
    /// the backend error.
    pub async fn submit_mentorship_feedback(
        &self,
        session_id: SessionId,
        feedback: SessionFeedback,
    ) -> Result<()> {
        self.env
            .track(format!("session_{session_id}"), async {
                let user_id = self.user_id()?;
                if !(MIN_RATING..=MAX_RATING).contains(&feedback.student_rating) {
                    return Err(StoreError::Validation(format!(
                        "Rating must be between {MIN_RATING} and {MAX_RATING}"
                    )));
                }
                let status = match self.cached_session(session_id) {
                    Some(session) => session.status,
                    None => {
                        self.backend
                            .select_one::<MentorshipSession>(
                                &Query::table("mentorship_sessions")
                                    .eq("id", session_id)
                                    .eq("student_id", user_id),
                            )
                            .await?
                            .status
                    }
                };
                feedback.validate_for(status)?;

                let patch = serde_json::to_value(&feedback).map_err(ClientError::from)?;
                let rows = self
                    .backend
                    .update(
                        &Query::table("mentorship_sessions")
                            .eq("id", session_id)
                            .eq("student_id", user_id),
                        patch,
                    )
                    .await?;
                if rows.is_empty() {
                    return Err(StoreError::NotFound("Session".into()));
                }
                tracing::info!(session_id = %session_id, rating = feedback.student_rating, "Feedback submitted");
                Ok(())
            })
            .await?;
        self.env.succeed("Thank you for your feedback");

        log_refresh(
            "mentorship_sessions",
            self.fetch_mentorship_sessions(FetchOptions::FORCE).await,
        );
        Ok(())
    }

    // =========================================================================
    // Billing
    // =========================================================================

    async fn plan(&self, plan_id: PlanId) -> Result<Plan> {
        if let Some(plan) = self
            .plans
            .data()
            .and_then(|all| all.iter().find(|p| p.id == plan_id).cloned())
        {
            return Ok(plan);
        }
        self.backend
            .select_maybe(&Query::table("plans").eq("id", plan_id))
            .await?
            .ok_or_else(|| StoreError::NotFound("Plan".into()))
    }

    async fn open_checkout(&self, plan: &Plan) -> Result<CheckoutTarget> {
        self.checkout
            .load()
            .await
            .map_err(|e| StoreError::PaymentFailed(format!("could not load checkout: {e}")))?;

        let body = PaymentRequest { plan_id: plan.id };
        let (target, key) = match plan.plan_type {
            PlanType::OneTime => {
                let order: CreateOrderResponse = self
                    .backend
                    .payment_as(PaymentEndpoint::CreateOrder, &body)
                    .await?;
                (
                    CheckoutTarget::Order {
                        order_id: order.order_id,
                        amount: order.amount,
                        currency: order.currency,
                    },
                    order.key_id,
                )
            }
            PlanType::Recurring => {
                let subscription: CreateSubscriptionResponse = self
                    .backend
                    .payment_as(PaymentEndpoint::CreateSubscription, &body)
                    .await?;
                (
                    CheckoutTarget::Subscription {
                        subscription_id: subscription.subscription_id,
                    },
                    subscription.key_id,
                )
            }
        };
        let key = key.or_else(|| self.payment_key.clone()).ok_or_else(|| {
            StoreError::from(ClientError::Configuration(
                "no payment key configured".into(),
            ))
        })?;

        let request = CheckoutRequest {
            key,
            target: target.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            prefill_name: None,
            prefill_email: None,
        }
        .with_payer(self.identity.profile().as_ref());

        tracing::info!(plan_id = %plan.id, reference = target.reference(), "Opening checkout");
        match self.checkout.open(request).await {
            CheckoutOutcome::Completed { payment_id, .. } => {
                tracing::info!(payment_id = %payment_id, "Checkout completed");
                Ok(target)
            }
            CheckoutOutcome::Dismissed => Err(StoreError::PaymentCancelled),
            CheckoutOutcome::Failed { reason } => Err(StoreError::PaymentFailed(reason)),
        }
    }

    /// Buy a plan through the checkout widget and wait for the webhook.
    ///
    /// After the widget reports success the store waits the settle delay,
    /// then re-reads orders (or subscriptions) and the profile with growing
    /// pauses until the gateway reference shows up or the retries run out.
    ///
    /// # Errors
    ///
    /// Returns `PaymentCancelled` when the modal is dismissed,
    /// `PaymentFailed` when the gateway fails, or the backend error.
    pub async fn purchase_plan(&self, plan_id: PlanId) -> Result<PurchaseOutcome> {
        let (plan_type, target) = self
            .env
            .track(format!("purchase_{plan_id}"), async {
                self.user_id()?;
                let plan = self.plan(plan_id).await?;
                if !plan.is_active {
                    return Err(StoreError::Validation(format!(
                        "{} is no longer on sale",
                        plan.name
                    )));
                }
                let target = self.open_checkout(&plan).await?;
                Ok((plan.plan_type, target))
            })
            .await?;

        self.env.inform("Payment successful! Processing your purchase...");
        let reference = target.reference().to_string();
        let outcome = self.settle_purchase(plan_type, reference).await;
        match &outcome {
            PurchaseOutcome::Settled { .. } => {
                self.env.succeed("Purchase complete. Your credits have been added.");
            }
            PurchaseOutcome::Pending { reference } => {
                tracing::warn!(reference = %reference, "Purchase not confirmed by webhook yet");
                self.env
                    .inform("Your payment is still processing. Credits will appear shortly.");
            }
        }
        Ok(outcome)
    }

    async fn settle_purchase(&self, plan_type: PlanType, reference: String) -> PurchaseOutcome {
        tokio::time::sleep(self.config.purchase_settle_delay).await;

        let mut waits = self.config.poll_schedule().into_iter();
        loop {
            if self.purchase_recorded(plan_type, &reference).await {
                return PurchaseOutcome::Settled { reference };
            }
            let Some(wait) = waits.next() else {
                return PurchaseOutcome::Pending { reference };
            };
            tracing::debug!(reference = %reference, wait_ms = wait.as_millis(), "Purchase not recorded yet");
            tokio::time::sleep(wait).await;
        }
    }

    async fn purchase_recorded(&self, plan_type: PlanType, reference: &str) -> bool {
        let recorded = async {
            match plan_type {
                PlanType::OneTime => self
                    .fetch_user_orders(FetchOptions::FORCE)
                    .await
                    .map(|orders| {
                        orders
                            .iter()
                            .any(|o| o.payment_gateway_order_id.as_deref() == Some(reference))
                    }),
                PlanType::Recurring => self
                    .fetch_subscriptions(FetchOptions::FORCE)
                    .await
                    .map(|subs| {
                        subs.iter().any(|s| {
                            s.payment_gateway_subscription_id.as_deref() == Some(reference)
                        })
                    }),
            }
        };
        let (recorded, profile) = futures::join!(recorded, self.identity.refresh_profile());
        log_refresh("profile", profile);
        match recorded {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!(reference, error = %e, "Purchase poll failed");
                false
            }
        }
    }

    /// Cancel one of the student's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the cached subscription is already
    /// over, or the backend error.
    pub async fn cancel_subscription(&self, subscription_id: SubscriptionId) -> Result<()> {
        self.env
            .track(format!("subscription_{subscription_id}"), async {
                let user_id = self.user_id()?;
                let cached = self
                    .subscriptions
                    .data()
                    .and_then(|all| all.iter().find(|s| s.id == subscription_id).cloned());
                if let Some(subscription) = cached {
                    if !subscription.status.is_cancellable() {
                        return Err(StoreError::Validation(
                            "This subscription is not active".into(),
                        ));
                    }
                }
                let rows = self
                    .backend
                    .update(
                        &Query::table("subscriptions")
                            .eq("id", subscription_id)
                            .eq("user_id", user_id),
                        json!({ "status": "canceled" }),
                    )
                    .await?;
                if rows.is_empty() {
                    return Err(StoreError::NotFound("Subscription".into()));
                }
                tracing::info!(subscription_id = %subscription_id, "Subscription cancelled");
                Ok(())
            })
            .await?;
        self.env.succeed("Subscription cancelled");

        log_refresh(
            "subscriptions",
            self.fetch_subscriptions(FetchOptions::FORCE).await,
        );
        Ok(())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Mark one notification read, updating the feed before the call.
    ///
    /// # Errors
    ///
    /// Returns the backend error after restoring the feed.
    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<()> {
        self.set_read(Some(id), true).await
    }

    /// Mark one notification unread again.
    ///
    /// # Errors
    ///
    /// Returns the backend error after restoring the feed.
    pub async fn mark_notification_unread(&self, id: NotificationId) -> Result<()> {
        self.set_read(Some(id), false).await
    }

    /// Mark every notification read.
    ///
    /// # Errors
    ///
    /// Returns the backend error after restoring the feed.
    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.set_read(None, true).await
    }

    async fn set_read(&self, id: Option<NotificationId>, read: bool) -> Result<()> {
        let user_id = match self.user_id() {
            Ok(user_id) => user_id,
            Err(err) => {
                self.env.fail(&err);
                return Err(err);
            }
        };
        let previous = self.notifications.modify(|feed| feed.with_read(id, read));

        let mut query = Query::table("notifications").eq("user_id", user_id);
        query = match id {
            Some(id) => query.eq("id", id),
            None => query.eq("is_read", !read),
        };
        match self.backend.update(&query, json!({ "is_read": read })).await {
            Ok(_) => {
                tracing::debug!(notification_id = ?id, read, "Notification read-state updated");
                Ok(())
            }
            Err(err) => {
                if previous.is_some() {
                    self.notifications.replace(previous);
                }
                let err = StoreError::from(err);
                self.env.fail(&err);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Help and support (uncached)
    // =========================================================================

    /// Published help articles, optionally in one category.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_help_articles(&self, category: Option<&str>) -> Result<Vec<HelpArticle>> {
        let mut query = Query::table("help_content")
            .eq("is_published", true)
            .order("sort_order", Direction::Ascending);
        if let Some(category) = category {
            query = query.eq("category", category);
        }
        self.env
            .track("help_articles", async { Ok(self.backend.select_as(&query).await?) })
            .await
    }

    /// Published help articles whose title, content or topic contains `term`.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn search_help_articles(&self, term: &str) -> Result<Vec<HelpArticle>> {
        let term = term.trim();
        if term.is_empty() {
            return self.fetch_help_articles(None).await;
        }
        let query = Query::table("help_content")
            .eq("is_published", true)
            .search(["title", "content", "topic"], term)
            .order("sort_order", Direction::Ascending);
        self.env
            .track("help_articles", async { Ok(self.backend.select_as(&query).await?) })
            .await
    }

    /// Open a support ticket.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty subject or description, or
    /// the procedure's error.
    pub async fn create_support_ticket(&self, ticket: &NewTicket) -> Result<TicketId> {
        let ticket_id = self
            .env
            .track("create_ticket", async {
                self.user_id()?;
                if ticket.subject.trim().is_empty() || ticket.description.trim().is_empty() {
                    return Err(StoreError::Validation(
                        "Subject and description are required".into(),
                    ));
                }
                let ticket_id = self
                    .backend
                    .call(&CreateTicketParams {
                        p_subject: ticket.subject.trim().to_string(),
                        p_description: ticket.description.trim().to_string(),
                        p_priority: ticket.priority,
                        p_type: ticket.ticket_type,
                    })
                    .await?;
                tracing::info!(ticket_id = %ticket_id, "Support ticket created");
                Ok(ticket_id)
            })
            .await?;
        self.env.succeed("Support ticket created");
        Ok(ticket_id)
    }

    /// The student's tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn fetch_support_tickets(&self) -> Result<Vec<SupportTicket>> {
        self.env
            .track("support_tickets", async {
                let query = Query::table("support_tickets")
                    .eq("user_id", self.user_id()?)
                    .order_desc("created_at");
                Ok(self.backend.select_as(&query).await?)
            })
            .await
    }

    /// Messages of one ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_ticket_messages(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<SupportTicketMessage>> {
        let query = Query::table("support_ticket_messages")
            .eq("ticket_id", ticket_id)
            .order("created_at", Direction::Ascending);
        self.env
            .track(format!("ticket_{ticket_id}"), async {
                Ok(self.backend.select_as(&query).await?)
            })
            .await
    }

    /// Reply on a ticket thread.
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
        Ok(())
    }

    /// Sessions that can still be cancelled, soonest first.
    #[must_use]
    pub fn upcoming_sessions(&self) -> Vec<MentorshipSession> {
        let mut upcoming: Vec<MentorshipSession> = self
            .mentorship_sessions
            .data()
            .map(|all| {
                all.iter()
                    .filter(|s| {
                        s.status.is_cancellable_by_student()
                            || s.status == MentorshipStatus::InProgress
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        upcoming.sort_by_key(|s| s.scheduled_at.unwrap_or(s.created_at));
        upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use evalhub_core::NotificationType;

    fn notification(is_read: bool) -> Notification {
        Notification {
            id: NotificationId::generate(),
            user_id: UserId::generate(),
            notification_type: NotificationType::System,
            title: "Hello".into(),
            message: "World".into(),
            data: serde_json::Value::Null,
            is_read,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn feed_counts_unread() {
        let feed = NotificationFeed::new(vec![notification(false), notification(true)]);
        assert_eq!(feed.unread, 1);
    }

    #[test]
    fn marking_read_twice_decrements_once() {
        let feed = NotificationFeed::new(vec![notification(false), notification(false)]);
        let id = feed.items[0].id;
        let once = feed.with_read(Some(id), true);
        let twice = once.with_read(Some(id), true);
        assert_eq!(once.unread, 1);
        assert_eq!(twice, once);
    }

    #[test]
    fn mark_all_and_unmark() {
        let feed = NotificationFeed::new(vec![notification(false), notification(false)]);
        let all = feed.with_read(None, true);
        assert_eq!(all.unread, 0);
        let back = all.with_read(Some(feed.items[1].id), false);
        assert_eq!(back.unread, 1);
        assert!(!back.items[1].is_read);
    }
}
