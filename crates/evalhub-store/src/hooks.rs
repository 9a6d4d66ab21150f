//! Seams to the UI layer: notices, confirmation prompts and the payment widget.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use evalhub_core::Profile;

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Something worked.
    Success,
    /// Neutral progress message.
    Info,
    /// Something failed.
    Error,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notice {
    /// Success notice.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Info notice.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Delivers notices to the user.
pub trait Notifier: Send + Sync {
    /// Show a notice. Must not block.
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing log. The default when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "notice"),
            NoticeLevel::Success | NoticeLevel::Info => {
                tracing::info!(message = %notice.message, "notice");
            }
        }
    }
}

/// Fans notices out to any number of UI subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notice>,
}

impl BroadcastNotifier {
    /// Keep up to `capacity` undelivered notices per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every notice sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notice: Notice) {
        // No subscriber is not an error; the notice is simply dropped.
        let _ = self.sender.send(notice);
    }
}

/// Blocking yes/no prompt shown before destructive actions.
pub trait Confirm: Send + Sync {
    /// Ask the user; `true` means proceed.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt the same way. For headless use and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirm(pub bool);

impl Confirm for FixedConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// What the checkout widget should charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// Pay a one-time gateway order.
    Order {
        /// Gateway order reference.
        order_id: String,
        /// Amount in minor units.
        amount: i64,
        /// ISO currency code.
        currency: String,
    },
    /// Authorise a gateway subscription.
    Subscription {
        /// Gateway subscription reference.
        subscription_id: String,
    },
}

impl CheckoutTarget {
    /// The gateway reference the webhook will record.
    #[must_use]
    pub fn reference(&self) -> &str {
        match self {
            Self::Order { order_id, .. } => order_id,
            Self::Subscription {
                subscription_id, ..
            } => subscription_id,
        }
    }
}

/// Everything the payment modal needs to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Publishable gateway key.
    pub key: String,
    /// Order or subscription to pay.
    pub target: CheckoutTarget,
    /// Plan name shown in the modal.
    pub name: String,
    /// Plan description shown in the modal.
    pub description: Option<String>,
    /// Prefilled payer name.
    pub prefill_name: Option<String>,
    /// Prefilled payer email.
    pub prefill_email: Option<String>,
}

impl CheckoutRequest {
    /// Fill the payer fields from a profile.
    #[must_use]
    pub fn with_payer(mut self, profile: Option<&Profile>) -> Self {
        if let Some(profile) = profile {
            self.prefill_name.clone_from(&profile.full_name);
            self.prefill_email.clone_from(&profile.email);
        }
        self
    }
}

/// How the payment modal closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The gateway's success handler fired.
    Completed {
        /// Gateway payment reference.
        payment_id: String,
        /// Gateway signature over the payment.
        signature: Option<String>,
    },
    /// The user closed the modal.
    Dismissed,
    /// The gateway reported a failure.
    Failed {
        /// Gateway's reason.
        reason: String,
    },
}

/// The third-party checkout widget.
#[async_trait]
pub trait CheckoutWidget: Send + Sync {
    /// Load the gateway's client script. Called before every checkout; cheap
    /// once loaded.
    async fn load(&self) -> Result<(), String>;

    /// Open the modal and wait until it closes.
    async fn open(&self, request: CheckoutRequest) -> CheckoutOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.notify(Notice::success("Saved"));
        assert_eq!(rx.recv().await.unwrap(), Notice::success("Saved"));
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        BroadcastNotifier::new(1).notify(Notice::info("nobody listening"));
    }

    #[test]
    fn checkout_reference() {
        let target = CheckoutTarget::Subscription {
            subscription_id: "sub_1".into(),
        };
        assert_eq!(target.reference(), "sub_1");
    }
}
