//! Request and response types for auth and payment calls.

use serde::{Deserialize, Serialize};

use evalhub_core::{PlanId, Role, UserId};

/// The authenticated identity, as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Identity id, shared with the profile row.
    pub id: UserId,
    /// Sign-in email.
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata captured at signup.
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// A signed-in session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for data calls.
    pub access_token: String,
    /// Token used to renew the session.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// The identity the session belongs to.
    pub user: AuthUser,
}

/// Signup form.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    /// Sign-in email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Display name stored in metadata.
    pub full_name: Option<String>,
    /// Role stored in metadata; the backend trigger copies it to the profile.
    pub role: Role,
}

/// Outcome of a signup: a session, or just the identity when the email still
/// has to be confirmed.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Signed in immediately.
    SignedIn(AuthSession),
    /// Confirmation email sent.
    ConfirmationRequired(AuthUser),
}

/// One-time token kinds accepted by `verify_otp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpType {
    /// Password recovery link.
    Recovery,
    /// Signup confirmation link.
    Signup,
    /// Invitation link.
    Invite,
    /// Magic sign-in link.
    #[serde(rename = "magiclink")]
    MagicLink,
    /// Email change confirmation.
    EmailChange,
    /// Generic email OTP.
    Email,
}

impl std::str::FromStr for OtpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown OTP type: {s}"))
    }
}

/// Admin-created identity.
#[derive(Debug, Clone, Serialize)]
pub struct NewIdentity {
    /// Sign-in email.
    pub email: String,
    /// Initial password.
    pub password: String,
    /// Skip the confirmation email.
    pub email_confirm: bool,
    /// Metadata such as `full_name` and `role`.
    pub user_metadata: serde_json::Value,
}

/// The payment API routes served next to the web app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEndpoint {
    /// Create a gateway order for a one-time plan.
    CreateOrder,
    /// Create a gateway subscription for a recurring plan.
    CreateSubscription,
}

impl PaymentEndpoint {
    /// Route path.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::CreateOrder => "/api/payment/create-order",
            Self::CreateSubscription => "/api/payment/create-subscription",
        }
    }
}

/// Body of both payment routes.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    /// Plan being bought.
    pub plan_id: PlanId,
}

/// Response of `create-order`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    /// Gateway order reference.
    pub order_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Publishable checkout key, when the route supplies it.
    #[serde(default)]
    pub key_id: Option<String>,
}

/// Response of `create-subscription`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionResponse {
    /// Gateway subscription reference.
    pub subscription_id: String,
    /// Publishable checkout key, when the route supplies it.
    #[serde(default)]
    pub key_id: Option<String>,
}
