//! Webhook reconciler.
//!
//! Single entry point for verified provider events. Each delivery is an
//! independent, request-scoped unit of work; the provider delivers
//! at-least-once and may deliver out of order or concurrently. Replays and
//! lost insert races reconcile to "already handled"; stale transitions out
//! of `Cancelled` reconcile to a no-op. Ordering between conflicting
//! updates is last-write-wins - there is no event version check.

use std::sync::Arc;

use thiserror::Error;

use clementine_core::{StoreId, SubscriptionStatus};

use crate::db::{RepositoryError, SubscriptionStore};
use crate::models::Subscription;
use crate::provider::event::{InvoiceEvent, SubscriptionEvent};
use crate::provider::{PaymentProviderGateway, ProviderError, ProviderEvent};
use crate::services::lifecycle::{
    CreateSubscription, LifecycleError, SubscriptionLifecycleService,
};

/// Errors from webhook reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The event is permanently unprocessable (e.g., a subscription-mode
    /// checkout without a `store_id` in its metadata). Retrying cannot help.
    #[error("missing event metadata: {0}")]
    MissingMetadata(String),

    /// A lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Persistence failure during a lookup.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Payment provider failure (e.g., fetching the snapshot).
    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// What reconciling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A lifecycle operation ran.
    Applied,
    /// Duplicate delivery; the subscription was already recorded.
    AlreadyRecorded,
    /// The event refers to a subscription this system never recorded.
    NotTracked,
    /// Event kind (or staleness) this system deliberately does not act on.
    Ignored,
}

/// Maps incoming provider events to lifecycle operations.
#[derive(Clone)]
pub struct WebhookReconciler {
    lifecycle: SubscriptionLifecycleService,
    subscriptions: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentProviderGateway>,
}

impl WebhookReconciler {
    /// Create a new reconciler.
    #[must_use]
    pub fn new(
        lifecycle: SubscriptionLifecycleService,
        subscriptions: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentProviderGateway>,
    ) -> Self {
        Self {
            lifecycle,
            subscriptions,
            gateway,
        }
    }

    /// Reconcile one verified event.
    ///
    /// # Errors
    ///
    /// Failures are logged here and returned so the HTTP boundary can pick
    /// the retry signal for the provider.
    pub async fn execute(&self, event: ProviderEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let kind = event.kind().to_owned();
        match self.dispatch(event).await {
            Ok(outcome) => {
                tracing::debug!(event = %kind, ?outcome, "webhook event reconciled");
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!(event = %kind, error = %err, "webhook reconciliation failed");
                Err(err)
            }
        }
    }

    async fn dispatch(&self, event: ProviderEvent) -> Result<ReconcileOutcome, ReconcileError> {
        match event {
            ProviderEvent::CheckoutSessionCompleted {
                session_id,
                mode,
                store_id,
                provider_subscription_id,
                ..
            } => {
                if mode != "subscription" {
                    return Ok(ReconcileOutcome::Ignored);
                }
                self.checkout_completed(&session_id, store_id.as_deref(), provider_subscription_id)
                    .await
            }
            ProviderEvent::SubscriptionCreated(e) | ProviderEvent::SubscriptionUpdated(e) => {
                self.subscription_changed(&e).await
            }
            ProviderEvent::SubscriptionDeleted {
                provider_subscription_id,
            } => {
                self.transition_tracked(
                    &provider_subscription_id,
                    SubscriptionStatus::Cancelled,
                    None,
                    None,
                )
                .await
            }
            ProviderEvent::InvoicePaymentSucceeded(e) => {
                self.invoice_settled(&e, SubscriptionStatus::Paid).await
            }
            ProviderEvent::InvoicePaymentFailed(e) => {
                self.invoice_settled(&e, SubscriptionStatus::Pending).await
            }
            ProviderEvent::Unrecognized { kind } => {
                tracing::debug!(event = %kind, "ignoring unrecognized provider event");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    /// `checkout.session.completed`: record the subscription the checkout
    /// established, exactly once.
    async fn checkout_completed(
        &self,
        session_id: &str,
        store_id: Option<&str>,
        provider_subscription_id: Option<String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let store_id: StoreId = store_id
            .ok_or_else(|| {
                ReconcileError::MissingMetadata(format!(
                    "checkout session {session_id} has no store_id metadata"
                ))
            })?
            .parse()
            .map_err(|_| {
                ReconcileError::MissingMetadata(format!(
                    "checkout session {session_id} has an unparseable store_id"
                ))
            })?;

        let provider_subscription_id = provider_subscription_id.ok_or_else(|| {
            ReconcileError::MissingMetadata(format!(
                "checkout session {session_id} has no subscription id"
            ))
        })?;

        // Fast path for replayed deliveries. The unique index below is the
        // authority when two deliveries race past this check.
        if self
            .subscriptions
            .find_by_provider_id(&provider_subscription_id)
            .await?
            .is_some()
        {
            return Ok(ReconcileOutcome::AlreadyRecorded);
        }

        let snapshot = self
            .gateway
            .subscription_snapshot(&provider_subscription_id)
            .await?;

        let result = self
            .lifecycle
            .create_subscription(CreateSubscription {
                store_id,
                plan_name: snapshot.plan_name,
                plan_id: snapshot.plan_id,
                provider: self.gateway.name().to_owned(),
                current_period_start: snapshot.current_period_start,
                current_period_end: snapshot.current_period_end,
                price: snapshot.price,
                status: SubscriptionStatus::Paid,
                next_payment: snapshot.next_payment,
                provider_subscription_id: Some(snapshot.provider_subscription_id),
                provider_customer_id: Some(snapshot.customer_id),
            })
            .await;

        match result {
            Ok(_) => Ok(ReconcileOutcome::Applied),
            // Lost the insert race against a concurrent delivery of the same
            // session: the subscription exists, which is what this event
            // wanted.
            Err(LifecycleError::Repository(RepositoryError::Conflict(_))) => {
                Ok(ReconcileOutcome::AlreadyRecorded)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `customer.subscription.created` / `.updated`: mirror the provider's
    /// status onto the local record.
    async fn subscription_changed(
        &self,
        event: &SubscriptionEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.transition_tracked(
            &event.provider_subscription_id,
            internal_status(&event.status),
            event.current_period_start,
            event.current_period_end,
        )
        .await
    }

    async fn invoice_settled(
        &self,
        event: &InvoiceEvent,
        status: SubscriptionStatus,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(provider_subscription_id) = &event.provider_subscription_id else {
            // One-off invoice with no subscription attached.
            return Ok(ReconcileOutcome::Ignored);
        };

        let Some(subscription) = self
            .subscriptions
            .find_by_provider_id(provider_subscription_id)
            .await?
        else {
            return Ok(ReconcileOutcome::NotTracked);
        };

        self.apply_transition(
            &subscription,
            status,
            None,
            event.period_end,
            event.next_payment,
        )
        .await
    }

    /// Look up the local subscription for a provider ID and move it to
    /// `status`; events for untracked subscriptions are no-ops.
    async fn transition_tracked(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
        period_start: Option<chrono::DateTime<chrono::Utc>>,
        period_end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(subscription) = self
            .subscriptions
            .find_by_provider_id(provider_subscription_id)
            .await?
        else {
            return Ok(ReconcileOutcome::NotTracked);
        };

        self.apply_transition(&subscription, status, period_start, period_end, None)
            .await
    }

    async fn apply_transition(
        &self,
        subscription: &Subscription,
        status: SubscriptionStatus,
        period_start: Option<chrono::DateTime<chrono::Utc>>,
        period_end: Option<chrono::DateTime<chrono::Utc>>,
        next_payment: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let result = self
            .lifecycle
            .update_status(subscription.id, status, period_start, period_end, next_payment)
            .await;

        match result {
            Ok(_) => Ok(ReconcileOutcome::Applied),
            // A delivery that arrived after the subscription was cancelled;
            // the terminal state wins.
            Err(LifecycleError::InvalidTransition { from, to }) => {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    %from,
                    %to,
                    "ignoring stale event against terminal state"
                );
                Ok(ReconcileOutcome::Ignored)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Provider status string -> local status.
///
/// Anything that is not clearly active or terminated (trialing, past_due,
/// incomplete, ...) maps to `Pending`: the store is not visible until the
/// provider confirms payment.
fn internal_status(provider_status: &str) -> SubscriptionStatus {
    match provider_status {
        "active" => SubscriptionStatus::Paid,
        "canceled" => SubscriptionStatus::Cancelled,
        _ => SubscriptionStatus::Pending,
    }
}
