//! Billing business logic.
//!
//! - [`lifecycle`] - creating, updating, and cancelling subscriptions,
//!   including the store-visibility side effect
//! - [`reconciler`] - mapping verified provider webhook events onto
//!   lifecycle operations

pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::{CreateSubscription, LifecycleError, SubscriptionLifecycleService};
pub use reconciler::{ReconcileError, ReconcileOutcome, WebhookReconciler};
