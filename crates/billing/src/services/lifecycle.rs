//! Subscription lifecycle service.
//!
//! Owns the decision logic that maps direct API calls (and, via the webhook
//! reconciler, provider events) onto subscription state and the owning
//! store's `is_paid` visibility flag. The atomic pairing of the two writes
//! lives in the [`SubscriptionStore`] implementations; this layer decides
//! what to write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use clementine_core::{StoreId, SubscriptionId, SubscriptionStatus};

use crate::db::{RepositoryError, StoreDirectory, SubscriptionStore};
use crate::models::{NewSubscription, StatusChange, Subscription};
use crate::provider::{PaymentProviderGateway, ProviderError};

/// Errors from subscription lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Referenced store does not exist.
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    /// Referenced subscription does not exist.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The guarded transition table rejected the requested status change.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// Persistence failure (includes uniqueness conflicts).
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Payment provider failure.
    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Input for [`SubscriptionLifecycleService::create_subscription`].
#[derive(Debug, Clone)]
pub struct CreateSubscription {
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

/// Subscription lifecycle operations.
///
/// Constructed once at process start with its collaborators injected; cheap
/// to clone.
#[derive(Clone)]
pub struct SubscriptionLifecycleService {
    subscriptions: Arc<dyn SubscriptionStore>,
    stores: Arc<dyn StoreDirectory>,
    gateway: Arc<dyn PaymentProviderGateway>,
}

impl SubscriptionLifecycleService {
    /// Create a new lifecycle service.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        stores: Arc<dyn StoreDirectory>,
        gateway: Arc<dyn PaymentProviderGateway>,
    ) -> Self {
        Self {
            subscriptions,
            stores,
            gateway,
        }
    }

    /// Create a subscription for a store.
    ///
    /// When the initial status is `Paid`, the owning store becomes visible
    /// (`is_paid = true`) as part of the same persistence unit.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StoreNotFound`] if the store does not
    /// exist, and [`RepositoryError::Conflict`] (wrapped) when the
    /// `provider_subscription_id` is already recorded.
    pub async fn create_subscription(
        &self,
        input: CreateSubscription,
    ) -> Result<Subscription, LifecycleError> {
        let store = self
            .stores
            .get(input.store_id)
            .await?
            .ok_or(LifecycleError::StoreNotFound(input.store_id))?;

        let subscription = self
            .subscriptions
            .insert(NewSubscription {
                store_id: store.id,
                plan_name: input.plan_name,
                plan_id: input.plan_id,
                provider: input.provider,
                current_period_start: input.current_period_start,
                current_period_end: input.current_period_end,
                price: input.price,
                status: input.status,
                next_payment: input.next_payment,
                provider_subscription_id: input.provider_subscription_id,
                provider_customer_id: input.provider_customer_id,
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            store_id = %subscription.store_id,
            status = %subscription.status,
            "subscription created"
        );

        Ok(subscription)
    }

    /// Change a subscription's status, updating any supplied period fields
    /// and re-deriving the owning store's `is_paid` flag.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SubscriptionNotFound`] for an unknown ID and
    /// [`LifecycleError::InvalidTransition`] when the transition table
    /// rejects the change (`Cancelled` is terminal).
    pub async fn update_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        period_start: Option<DateTime<Utc>>,
        period_end: Option<DateTime<Utc>>,
        next_payment: Option<DateTime<Utc>>,
    ) -> Result<Subscription, LifecycleError> {
        let current = self
            .subscriptions
            .find(id)
            .await?
            .ok_or(LifecycleError::SubscriptionNotFound(id))?;

        if !current.status.can_transition_to(status) {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let updated = self
            .subscriptions
            .apply_change(
                id,
                StatusChange {
                    status,
                    current_period_start: period_start,
                    current_period_end: period_end,
                    next_payment,
                    cancel_at_period_end: None,
                },
            )
            .await?;

        tracing::info!(
            subscription_id = %updated.id,
            store_id = %updated.store_id,
            from = %current.status,
            to = %updated.status,
            "subscription status updated"
        );

        Ok(updated)
    }

    /// Cancel a subscription.
    ///
    /// `immediate = true` transitions to `Cancelled` now (the owning store
    /// loses visibility in the same unit). `immediate = false` keeps the
    /// current status, marks `cancel_at_period_end`, and relies on the
    /// provider's end-of-period event - with a lazy fallback in
    /// [`Self::current_subscription_for_store`] - to perform the real
    /// transition.
    ///
    /// The provider is asked to cancel first, so a gateway failure leaves
    /// local state untouched and the call safely retryable.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::SubscriptionNotFound`] for an unknown ID.
    pub async fn cancel(
        &self,
        id: SubscriptionId,
        immediate: bool,
    ) -> Result<Subscription, LifecycleError> {
        let current = self
            .subscriptions
            .find(id)
            .await?
            .ok_or(LifecycleError::SubscriptionNotFound(id))?;

        if let Some(provider_id) = &current.provider_subscription_id {
            self.gateway
                .cancel_subscription(provider_id, immediate)
                .await?;
        }

        let change = if immediate {
            StatusChange::to(SubscriptionStatus::Cancelled)
        } else {
            StatusChange {
                cancel_at_period_end: Some(true),
                ..StatusChange::to(current.status)
            }
        };

        let updated = self.subscriptions.apply_change(id, change).await?;

        tracing::info!(
            subscription_id = %updated.id,
            store_id = %updated.store_id,
            immediate,
            "subscription cancellation requested"
        );

        Ok(updated)
    }

    /// The store's current subscription, if any.
    ///
    /// Applies a pending end-of-period cancellation whose period has elapsed
    /// before returning, so readers never observe a subscription that should
    /// already be cancelled. This read-side evaluation is the scheduled
    /// half of `cancel(immediate = false)`; no background job exists.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Repository`] on persistence failures.
    pub async fn current_subscription_for_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Subscription>, LifecycleError> {
        let Some(subscription) = self.subscriptions.find_by_store(store_id).await? else {
            return Ok(None);
        };

        if subscription.cancel_at_period_end
            && subscription.status != SubscriptionStatus::Cancelled
            && subscription.current_period_end <= Utc::now()
        {
            tracing::info!(
                subscription_id = %subscription.id,
                store_id = %subscription.store_id,
                "applying deferred end-of-period cancellation"
            );
            let cancelled = self
                .subscriptions
                .apply_change(
                    subscription.id,
                    StatusChange::to(SubscriptionStatus::Cancelled),
                )
                .await?;
            return Ok(Some(cancelled));
        }

        Ok(Some(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;

    use clementine_core::UserId;

    use crate::db::InMemoryBilling;
    use crate::provider::{
        CheckoutSession, CheckoutSessionRequest, ProviderEvent, SubscriptionSnapshot,
    };

    /// Gateway double that records cancellation calls.
    #[derive(Default)]
    struct RecordingGateway {
        cancellations: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl crate::provider::PaymentProviderGateway for RecordingGateway {
        fn name(&self) -> &str {
            "test-provider"
        }

        async fn create_checkout_session(
            &self,
            _request: CheckoutSessionRequest,
        ) -> Result<CheckoutSession, ProviderError> {
            Ok(CheckoutSession {
                url: "https://checkout.test/session".to_owned(),
            })
        }

        async fn subscription_snapshot(
            &self,
            provider_subscription_id: &str,
        ) -> Result<SubscriptionSnapshot, ProviderError> {
            Err(ProviderError::ResourceNotFound(
                provider_subscription_id.to_owned(),
            ))
        }

        fn verify_and_decode_event(
            &self,
            _payload: &[u8],
            _signature_header: &str,
        ) -> Result<ProviderEvent, ProviderError> {
            Err(ProviderError::InvalidSignature("test double".to_owned()))
        }

        async fn cancel_subscription(
            &self,
            provider_subscription_id: &str,
            immediate: bool,
        ) -> Result<(), ProviderError> {
            self.cancellations
                .lock()
                .expect("lock poisoned")
                .push((provider_subscription_id.to_owned(), immediate));
            Ok(())
        }
    }

    struct Harness {
        billing: Arc<InMemoryBilling>,
        gateway: Arc<RecordingGateway>,
        service: SubscriptionLifecycleService,
        store_id: StoreId,
    }

    fn harness() -> Harness {
        let billing = Arc::new(InMemoryBilling::new());
        let gateway = Arc::new(RecordingGateway::default());
        let store_id = StoreId::generate();
        billing.seed_store(store_id, UserId::generate(), "Test Store");

        let service = SubscriptionLifecycleService::new(
            billing.clone(),
            billing.clone(),
            gateway.clone(),
        );

        Harness {
            billing,
            gateway,
            service,
            store_id,
        }
    }

    fn create_input(store_id: StoreId, status: SubscriptionStatus) -> CreateSubscription {
        let now = Utc::now();
        CreateSubscription {
            store_id,
            plan_name: "Basic Plan".to_owned(),
            plan_id: "price_basic".to_owned(),
            provider: "test-provider".to_owned(),
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            price: Decimal::new(29_99, 2),
            status,
            next_payment: None,
            provider_subscription_id: Some("sub_test_1".to_owned()),
            provider_customer_id: Some("cus_test_1".to_owned()),
        }
    }

    async fn store_is_paid(h: &Harness) -> bool {
        use crate::db::StoreDirectory as _;
        h.billing
            .get(h.store_id)
            .await
            .expect("store lookup")
            .expect("store exists")
            .is_paid
    }

    #[tokio::test]
    async fn test_create_paid_subscription_marks_store_paid() {
        let h = harness();

        let created = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("creates");

        assert_eq!(created.status, SubscriptionStatus::Paid);
        assert_eq!(created.plan_name, "Basic Plan");
        assert!(store_is_paid(&h).await);
    }

    #[tokio::test]
    async fn test_create_pending_subscription_leaves_store_unpaid() {
        let h = harness();

        h.service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Pending))
            .await
            .expect("creates");

        assert!(!store_is_paid(&h).await);
    }

    #[tokio::test]
    async fn test_create_for_unknown_store_fails_without_record() {
        let h = harness();
        let missing = StoreId::generate();

        let result = h
            .service
            .create_subscription(create_input(missing, SubscriptionStatus::Paid))
            .await;

        assert!(matches!(result, Err(LifecycleError::StoreNotFound(id)) if id == missing));
        assert_eq!(h.billing.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_provider_id_conflicts() {
        let h = harness();

        h.service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("first create");

        let result = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::Repository(RepositoryError::Conflict(_)))
        ));
        assert_eq!(h.billing.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_update_status_syncs_store_flag() {
        let h = harness();
        let created = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("creates");
        assert!(store_is_paid(&h).await);

        let updated = h
            .service
            .update_status(created.id, SubscriptionStatus::Cancelled, None, None, None)
            .await
            .expect("updates");

        assert_eq!(updated.status, SubscriptionStatus::Cancelled);
        assert!(!store_is_paid(&h).await);
    }

    #[tokio::test]
    async fn test_update_unknown_subscription_fails() {
        let h = harness();
        let missing = SubscriptionId::generate();

        let result = h
            .service
            .update_status(missing, SubscriptionStatus::Paid, None, None, None)
            .await;

        assert!(
            matches!(result, Err(LifecycleError::SubscriptionNotFound(id)) if id == missing)
        );
    }

    #[tokio::test]
    async fn test_cancelled_is_terminal() {
        let h = harness();
        let created = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("creates");

        h.service
            .update_status(created.id, SubscriptionStatus::Cancelled, None, None, None)
            .await
            .expect("cancels");

        let result = h
            .service
            .update_status(created.id, SubscriptionStatus::Paid, None, None, None)
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                from: SubscriptionStatus::Cancelled,
                to: SubscriptionStatus::Paid,
            })
        ));
    }

    #[tokio::test]
    async fn test_immediate_cancel_clears_visibility_and_calls_provider() {
        let h = harness();
        let created = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("creates");

        let cancelled = h.service.cancel(created.id, true).await.expect("cancels");

        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(!store_is_paid(&h).await);
        let calls = h.gateway.cancellations.lock().expect("lock poisoned");
        assert_eq!(calls.as_slice(), &[("sub_test_1".to_owned(), true)]);
    }

    #[tokio::test]
    async fn test_deferred_cancel_keeps_paid_until_period_end() {
        let h = harness();
        let created = h
            .service
            .create_subscription(create_input(h.store_id, SubscriptionStatus::Paid))
            .await
            .expect("creates");

        let deferred = h.service.cancel(created.id, false).await.expect("cancels");

        assert_eq!(deferred.status, SubscriptionStatus::Paid);
        assert!(deferred.cancel_at_period_end);
        assert!(store_is_paid(&h).await);

        let current = h
            .service
            .current_subscription_for_store(h.store_id)
            .await
            .expect("reads")
            .expect("present");
        assert_eq!(current.status, SubscriptionStatus::Paid);
    }

    #[tokio::test]
    async fn test_deferred_cancel_applies_after_period_end_on_read() {
        let h = harness();
        let mut input = create_input(h.store_id, SubscriptionStatus::Paid);
        // Period that has already elapsed.
        input.current_period_start = Utc::now() - Duration::days(31);
        input.current_period_end = Utc::now() - Duration::days(1);
        let created = h
            .service
            .create_subscription(input)
            .await
            .expect("creates");

        h.service.cancel(created.id, false).await.expect("cancels");

        let current = h
            .service
            .current_subscription_for_store(h.store_id)
            .await
            .expect("reads")
            .expect("present");

        assert_eq!(current.status, SubscriptionStatus::Cancelled);
        assert!(!store_is_paid(&h).await);
    }
}
