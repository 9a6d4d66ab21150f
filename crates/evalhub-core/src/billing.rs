//! Plans, orders and subscriptions.
//!
//! Plans are authored by admins. Orders and subscriptions are written by the
//! payment gateway's webhooks; the client only reads them, except that a
//! student may cancel their own subscription.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::CreditType;
use crate::error::{CoreError, Result};
use crate::{OrderId, PlanId, SubscriptionId, UserId};

/// How a plan is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Single payment through an order.
    OneTime,
    /// Repeating payment through a subscription.
    Recurring,
}

/// Billing period unit of a recurring plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    /// Daily.
    Daily,
    /// Weekly.
    Weekly,
    /// Monthly.
    Monthly,
    /// Yearly.
    Yearly,
}

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// Marketing copy.
    #[serde(default)]
    pub description: Option<String>,
    /// Price in minor currency units (paise, cents).
    pub price: i64,
    /// ISO currency code.
    pub currency: String,
    /// Billing mode.
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    /// Period unit for recurring plans.
    #[serde(default)]
    pub interval: Option<BillingInterval>,
    /// Number of units per period.
    #[serde(default)]
    pub interval_count: Option<u32>,
    /// GS credits granted per purchase or period.
    #[serde(default)]
    pub gs_credits: i64,
    /// Specialized credits granted per purchase or period.
    #[serde(default)]
    pub specialized_credits: i64,
    /// Mentorship credits granted per purchase or period.
    #[serde(default)]
    pub mentorship_credits: i64,
    /// Inactive plans are hidden from students. Plans are never deleted.
    pub is_active: bool,
    /// Gateway-side plan id for recurring plans.
    #[serde(default)]
    pub payment_gateway_plan_id: Option<String>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Plan {
    /// Credits of one type granted by this plan.
    #[must_use]
    pub const fn credits(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Gs => self.gs_credits,
            CreditType::Specialized => self.specialized_credits,
            CreditType::Mentorship => self.mentorship_credits,
        }
    }

    /// Check if this plan is billed through a subscription.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        matches!(self.plan_type, PlanType::Recurring)
    }
}

/// Fields an admin writes when creating or editing a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    /// Display name.
    pub name: String,
    /// Marketing copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
    /// ISO currency code.
    pub currency: String,
    /// Billing mode.
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    /// Period unit for recurring plans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<BillingInterval>,
    /// Units per period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_count: Option<u32>,
    /// GS credits granted.
    pub gs_credits: i64,
    /// Specialized credits granted.
    pub specialized_credits: i64,
    /// Mentorship credits granted.
    pub mentorship_credits: i64,
    /// Whether students can buy it.
    pub is_active: bool,
}

impl PlanDraft {
    /// Check the draft before it is written.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Plan name is required".into()));
        }
        if self.price <= 0 {
            return Err(CoreError::Validation("Price must be positive".into()));
        }
        if self.currency.len() != 3 {
            return Err(CoreError::Validation(format!(
                "Invalid currency code: {}",
                self.currency
            )));
        }
        if [self.gs_credits, self.specialized_credits, self.mentorship_credits]
            .iter()
            .any(|c| *c < 0)
        {
            return Err(CoreError::Validation("Credit grants cannot be negative".into()));
        }
        if self.plan_type == PlanType::Recurring && self.interval.is_none() {
            return Err(CoreError::Validation(
                "Recurring plans need a billing interval".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a one-time payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Payment captured and credits granted.
    Succeeded,
    /// Awaiting the gateway.
    Pending,
    /// Payment failed.
    Failed,
}

/// A one-time order, written by the payment webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Plan bought.
    pub plan_id: PlanId,
    /// Payment outcome.
    pub status: OrderStatus,
    /// Amount captured in minor currency units.
    #[serde(default)]
    pub amount_paid: i64,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Gateway order reference.
    #[serde(default)]
    pub payment_gateway_order_id: Option<String>,
    /// Gateway payment reference.
    #[serde(default)]
    pub payment_gateway_charge_id: Option<String>,
    /// When the order was recorded.
    pub created_at: DateTime<Utc>,
}

/// Gateway-driven subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created at the gateway, first payment not yet made.
    Created,
    /// Mandate authenticated.
    Authenticated,
    /// Paid up.
    Active,
    /// A renewal payment is being retried.
    Pending,
    /// Renewals stopped after repeated failures.
    Halted,
    /// Cancelled by the student or an admin.
    #[serde(alias = "cancelled")]
    Canceled,
    /// All periods billed.
    Completed,
}

impl SubscriptionStatus {
    /// A cancellation request makes sense from here.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Authenticated | Self::Active | Self::Pending
        )
    }
}

/// A recurring subscription, written by gateway events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Subscriber.
    pub user_id: UserId,
    /// Plan subscribed to.
    pub plan_id: PlanId,
    /// Lifecycle state.
    pub status: SubscriptionStatus,
    /// Start of the current period.
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    /// End of the current period.
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    /// Gateway subscription reference.
    #[serde(default)]
    pub payment_gateway_subscription_id: Option<String>,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
}

/// Revenue totals over a set of orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    /// Captured amount per currency, minor units.
    pub total_by_currency: BTreeMap<String, i64>,
    /// Orders counted in the totals.
    pub succeeded_orders: usize,
    /// Orders still awaiting the gateway.
    pub pending_orders: usize,
    /// Failed orders.
    pub failed_orders: usize,
}

impl RevenueSummary {
    /// Sum captured amounts of succeeded orders.
    #[must_use]
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut summary = Self::default();
        for order in orders {
            match order.status {
                OrderStatus::Succeeded => {
                    summary.succeeded_orders += 1;
                    let currency = order.currency.clone().unwrap_or_else(|| "INR".into());
                    *summary.total_by_currency.entry(currency).or_default() += order.amount_paid;
                }
                OrderStatus::Pending => summary.pending_orders += 1,
                OrderStatus::Failed => summary.failed_orders += 1,
            }
        }
        summary
    }
}
