//! Subscription domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use clementine_core::{StoreId, SubscriptionId, SubscriptionStatus};

/// A store's billing relationship with the payment provider (domain type).
///
/// Rows are never deleted; `Cancelled` is the terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Unique subscription ID, generated on creation.
    pub id: SubscriptionId,
    /// Store this subscription pays for.
    pub store_id: StoreId,
    /// Human-readable plan name (e.g., "Basic Plan").
    pub plan_name: String,
    /// Provider-side plan/price identifier.
    pub plan_id: String,
    /// Payment provider name (e.g., "stripe").
    pub provider: String,
    /// Start of the current billing period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current billing period.
    pub current_period_end: DateTime<Utc>,
    /// Amount charged per period.
    pub price: Decimal,
    /// Local lifecycle status.
    pub status: SubscriptionStatus,
    /// Cancellation is scheduled for `current_period_end`.
    pub cancel_at_period_end: bool,
    /// Next expected charge, when the provider reports one.
    pub next_payment: Option<DateTime<Utc>>,
    /// Provider-side subscription correlation ID (unique when present).
    pub provider_subscription_id: Option<String>,
    /// Provider-side customer correlation ID.
    pub provider_customer_id: Option<String>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to persist a new subscription row.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub store_id: StoreId,
    pub plan_name: String,
    pub plan_id: String,
    pub provider: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub price: Decimal,
    pub status: SubscriptionStatus,
    pub next_payment: Option<DateTime<Utc>>,
    pub provider_subscription_id: Option<String>,
    pub provider_customer_id: Option<String>,
}

/// A status transition plus the period fields that may travel with it.
///
/// `None` fields keep their persisted values; the storage layer applies the
/// whole change and the owning store's `is_paid` flag as one atomic unit.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub next_payment: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
}

impl StatusChange {
    /// A bare transition to `status`, leaving every other field untouched.
    #[must_use]
    pub const fn to(status: SubscriptionStatus) -> Self {
        Self {
            status,
            current_period_start: None,
            current_period_end: None,
            next_payment: None,
            cancel_at_period_end: None,
        }
    }

    /// Attach new billing period bounds to the change.
    #[must_use]
    pub const fn with_period(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.current_period_start = start;
        self.current_period_end = end;
        self
    }
}
