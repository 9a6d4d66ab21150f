//! The signed-in user and their profile.
//!
//! Every other store reads the profile from here: balances for credit
//! pre-checks, the id for per-user queries, the role for landing routes.

use std::sync::{Arc, Mutex, PoisonError};

use evalhub_client::{
    is_already_authenticated, AuthUser, Backend, BackendExt, OtpType, Query, SignUpOutcome,
    SignUpRequest,
};
use evalhub_core::{Profile, ProfileUpdate, Role, UserId};

use crate::cache::{CacheEnv, StoreStatus};
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::persistence::{
    JsonFilePersistence, MemoryPersistence, PersistedIdentity, SessionPersistence,
};

/// Where the UI should navigate after an auth action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Sign-in page.
    Login,
    /// Landing page for a role.
    Dashboard(Role),
}

impl Route {
    /// Landing route for a role.
    #[must_use]
    pub const fn for_role(role: Role) -> Self {
        Self::Dashboard(role)
    }

    /// URL path.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Dashboard(Role::Student) => "/student/dashboard",
            Self::Dashboard(Role::Faculty) => "/faculty/dashboard",
            Self::Dashboard(Role::Admin) => "/admin/dashboard",
        }
    }
}

/// Token carried by a password recovery link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryParams {
    /// Hashed one-time token.
    pub token_hash: String,
    /// Link kind.
    pub otp_type: OtpType,
}

impl RecoveryParams {
    /// Read `token_hash` and `type` from a link's query string.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let url = reqwest::Url::parse(url).ok()?;
        let mut token_hash = None;
        let mut otp_type = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "token_hash" => token_hash = Some(value.into_owned()),
                "type" => otp_type = value.parse::<OtpType>().ok(),
                _ => {}
            }
        }
        Some(Self {
            token_hash: token_hash.filter(|t| !t.is_empty())?,
            otp_type: otp_type?,
        })
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    user: Option<AuthUser>,
    profile: Option<Profile>,
}

/// Holds the authenticated user and profile.
pub struct IdentityStore {
    backend: Arc<dyn Backend>,
    env: CacheEnv,
    persistence: Arc<dyn SessionPersistence>,
    reset_redirect: Option<String>,
    state: Mutex<IdentityState>,
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("user_id", &self.user_id())
            .field("status", self.env.status())
            .finish_non_exhaustive()
    }
}

impl IdentityStore {
    /// Build from a context, persisting to the configured session file or
    /// to memory when none is set.
    #[must_use]
    pub fn new(ctx: &StoreContext) -> Self {
        let persistence: Arc<dyn SessionPersistence> = match &ctx.config.session_file {
            Some(path) => Arc::new(JsonFilePersistence::new(path.clone())),
            None => Arc::new(MemoryPersistence::default()),
        };
        Self::with_persistence(ctx, persistence)
    }

    /// Build with explicit persistence.
    #[must_use]
    pub fn with_persistence(ctx: &StoreContext, persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            backend: Arc::clone(&ctx.backend),
            env: ctx.cache_env(),
            persistence,
            reset_redirect: None,
            state: Mutex::new(IdentityState::default()),
        }
    }

    /// Link target for password recovery emails.
    #[must_use]
    pub fn with_reset_redirect(mut self, url: impl Into<String>) -> Self {
        self.reset_redirect = Some(url.into());
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current auth identity.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state().user.clone()
    }

    /// Id of the signed-in user.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.state().user.as_ref().map(|u| u.id)
    }

    /// Current profile.
    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        self.state().profile.clone()
    }

    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().user.is_some()
    }

    /// Loading flags and last error.
    #[must_use]
    pub fn status(&self) -> &Arc<StoreStatus> {
        self.env.status()
    }

    /// Id of the signed-in user, or `NotAuthenticated`.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out.
    pub fn require_user_id(&self) -> Result<UserId> {
        self.user_id().ok_or(StoreError::NotAuthenticated)
    }

    async fn commit(&self, user: Option<AuthUser>, profile: Option<Profile>) {
        let persisted = PersistedIdentity {
            user: user.clone(),
            profile: profile.clone(),
        };
        {
            let mut state = self.state();
            state.user = user;
            state.profile = profile;
        }
        let saved = if persisted.user.is_none() && persisted.profile.is_none() {
            self.persistence.clear().await
        } else {
            self.persistence.save(&persisted).await
        };
        if let Err(e) = saved {
            tracing::warn!(error = %e, "Failed to persist identity");
        }
    }

    async fn set_profile(&self, profile: Profile) {
        let user = self.user();
        self.commit(user, Some(profile)).await;
    }

    /// Restore the persisted pair without calling the backend.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the storage cannot be read.
    pub async fn hydrate(&self) -> Result<()> {
        let stored = self.persistence.load().await?;
        tracing::debug!(signed_in = stored.user.is_some(), "Hydrated identity");
        let mut state = self.state();
        state.user = stored.user;
        state.profile = stored.profile;
        Ok(())
    }

    /// Ask the backend who is signed in and load their profile.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the current pair is left as it was.
    pub async fn fetch_user(&self) -> Result<Option<Profile>> {
        self.env.track("user", self.load_user()).await
    }

    async fn load_user(&self) -> Result<Option<Profile>> {
        let Some(user) = self.backend.current_user().await? else {
            self.commit(None, None).await;
            return Ok(None);
        };
        let profile: Profile = self
            .backend
            .select_one(&Query::table("profiles").eq("id", user.id))
            .await?;
        tracing::debug!(user_id = %user.id, role = profile.role.as_str(), "Fetched user");
        self.commit(Some(user), Some(profile.clone())).await;
        Ok(Some(profile))
    }

    /// Re-read the profile row, typically after a credit change.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn refresh_profile(&self) -> Result<Option<Profile>> {
        let Some(user_id) = self.user_id() else {
            return Ok(None);
        };
        self.env
            .track("profile", async {
                let profile: Profile = self
                    .backend
                    .select_one(&Query::table("profiles").eq("id", user_id))
                    .await?;
                self.set_profile(profile.clone()).await;
                Ok(Some(profile))
            })
            .await
    }

    /// Merge `update` into the profile row and keep the stored result.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when signed out, or the backend error.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        let profile = self
            .env
            .track("profile", async {
                let user_id = self.require_user_id()?;
                if update.is_empty() {
                    return self.profile().ok_or(StoreError::NotAuthenticated);
                }
                let patch = serde_json::to_value(update)
                    .map_err(evalhub_client::ClientError::from)?;
                let rows: Vec<Profile> = self
                    .backend
                    .update_as(&Query::table("profiles").eq("id", user_id), patch)
                    .await?;
                let profile = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound("Profile".into()))?;
                tracing::info!(user_id = %user_id, "Profile updated");
                self.set_profile(profile.clone()).await;
                Ok(profile)
            })
            .await?;
        self.env.succeed("Profile updated successfully");
        Ok(profile)
    }

    /// Sign in and return the landing route for the user's role.
    ///
    /// A sign-in rejected because a session already exists counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn login(&self, email: &str, password: &str) -> Result<Route> {
        self.env
            .track("login", async {
                match self.backend.sign_in_with_password(email, password).await {
                    Ok(session) => {
                        tracing::info!(user_id = %session.user.id, "Signed in");
                    }
                    Err(err) if is_already_authenticated(&err) => {
                        tracing::info!("Already signed in; continuing to dashboard");
                    }
                    Err(err) => return Err(err.into()),
                }
                let profile = self.load_user().await?;
                let role = profile.map_or(Role::Student, |p| p.role);
                Ok(Route::for_role(role))
            })
            .await
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn signup(&self, request: &SignUpRequest) -> Result<SignUpOutcome> {
        let outcome = self
            .env
            .track("signup", async {
                let outcome = self.backend.sign_up(request).await?;
                if matches!(outcome, SignUpOutcome::SignedIn(_)) {
                    self.load_user().await?;
                }
                Ok(outcome)
            })
            .await?;
        match &outcome {
            SignUpOutcome::SignedIn(_) => self.env.succeed("Account created successfully"),
            SignUpOutcome::ConfirmationRequired(_) => {
                self.env.inform("Check your email to confirm your account");
            }
        }
        Ok(outcome)
    }

    /// Sign out, forget the pair and return the sign-in route.
    ///
    /// Local state is cleared even when the backend call fails.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn logout(&self) -> Result<Route> {
        let signed_out = self.backend.sign_out().await;
        self.commit(None, None).await;
        match signed_out {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(Route::Login)
            }
            Err(err) => {
                let err = StoreError::from(err);
                self.env.fail(&err);
                Err(err)
            }
        }
    }

    /// Email a recovery link.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        self.env
            .track("forgot_password", async {
                self.backend
                    .reset_password_for_email(email, self.reset_redirect.as_deref())
                    .await?;
                Ok(())
            })
            .await?;
        self.env.succeed("Password reset link sent to your email");
        Ok(())
    }

    /// Set a new password.
    ///
    /// Without a session, the recovery token in `link` (the URL the user
    /// arrived on) is exchanged for one first.
    ///
    /// # Errors
    ///
    /// Returns `Recovery` when no session can be established, or the backend
    /// error.
    pub async fn reset_password(&self, new_password: &str, link: Option<&str>) -> Result<()> {
        self.env
            .track("reset_password", async {
                if new_password.is_empty() {
                    return Err(StoreError::Validation("Password is required".into()));
                }
                if self.backend.current_user().await?.is_none() {
                    self.exchange_recovery_token(link).await?;
                    if self.backend.current_user().await?.is_none() {
                        return Err(StoreError::Recovery(
                            "Auth session missing. Please open the reset link from your email again."
                                .into(),
                        ));
                    }
                }
                self.backend.update_password(new_password).await?;
                tracing::info!("Password updated");
                Ok(())
            })
            .await?;
        self.env.succeed("Password updated successfully");
        Ok(())
    }

    async fn exchange_recovery_token(&self, link: Option<&str>) -> Result<()> {
        let Some(params) = link.and_then(RecoveryParams::from_url) else {
            tracing::debug!("No recovery token in link");
            return Ok(());
        };
        if params.otp_type != OtpType::Recovery {
            tracing::debug!(otp_type = ?params.otp_type, "Ignoring non-recovery token");
            return Ok(());
        }
        self.backend
            .verify_otp(&params.token_hash, OtpType::Recovery)
            .await
            .map_err(|e| StoreError::Recovery(format!("Invalid or expired reset link: {e}")))?;
        tracing::info!("Exchanged recovery token for a session");
        Ok(())
    }
}
