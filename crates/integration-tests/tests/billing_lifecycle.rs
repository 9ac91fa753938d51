//! End-to-end scenarios for the subscription lifecycle service.
//!
//! Each test wires the real lifecycle service over in-memory persistence
//! and a scripted gateway, then checks both the returned subscription and
//! the owning store's visibility projection.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use clementine_billing::services::{CreateSubscription, LifecycleError};
use clementine_core::{StoreId, SubscriptionId, SubscriptionStatus};
use clementine_integration_tests::BillingHarness;

fn basic_plan(store_id: StoreId, status: SubscriptionStatus) -> CreateSubscription {
    let now = Utc::now();
    CreateSubscription {
        store_id,
        plan_name: "Basic Plan".to_owned(),
        plan_id: "price_basic".to_owned(),
        provider: "stripe".to_owned(),
        current_period_start: now,
        current_period_end: now + Duration::days(30),
        price: Decimal::new(29_99, 2),
        status,
        next_payment: None,
        provider_subscription_id: Some("sub_lifecycle_1".to_owned()),
        provider_customer_id: Some("cus_lifecycle_1".to_owned()),
    }
}

// Scenario: a store starts unpaid; creating a PAID subscription for it must
// flip the visibility flag and echo the created record.
#[tokio::test]
async fn paid_subscription_creation_makes_store_visible() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Scenario A Store");
    assert!(!h.store_is_paid(store_id).await);

    let subscription = h
        .lifecycle
        .create_subscription(basic_plan(store_id, SubscriptionStatus::Paid))
        .await
        .expect("creates");

    assert_eq!(subscription.status, SubscriptionStatus::Paid);
    assert_eq!(subscription.plan_name, "Basic Plan");
    assert_eq!(subscription.price, Decimal::new(29_99, 2));
    assert!(h.store_is_paid(store_id).await);
}

#[tokio::test]
async fn pending_subscription_creation_keeps_store_hidden() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Pending Store");

    h.lifecycle
        .create_subscription(basic_plan(store_id, SubscriptionStatus::Pending))
        .await
        .expect("creates");

    assert!(!h.store_is_paid(store_id).await);
}

#[tokio::test]
async fn creation_for_missing_store_fails_and_writes_nothing() {
    let h = BillingHarness::new();
    let ghost = StoreId::generate();

    let result = h
        .lifecycle
        .create_subscription(basic_plan(ghost, SubscriptionStatus::Paid))
        .await;

    assert!(matches!(result, Err(LifecycleError::StoreNotFound(id)) if id == ghost));
    assert_eq!(h.billing.subscription_count(), 0);
}

#[tokio::test]
async fn update_for_unknown_subscription_fails_and_mutates_nothing() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Untouched Store");
    let ghost = SubscriptionId::generate();

    let result = h
        .lifecycle
        .update_status(ghost, SubscriptionStatus::Paid, None, None, None)
        .await;

    assert!(matches!(
        result,
        Err(LifecycleError::SubscriptionNotFound(id)) if id == ghost
    ));
    assert!(!h.store_is_paid(store_id).await);
}

// Scenario: cancelling a subscription whose store was visible must hide the
// store in the same operation.
#[tokio::test]
async fn cancellation_hides_previously_visible_store() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Scenario C Store");
    let subscription = h
        .lifecycle
        .create_subscription(basic_plan(store_id, SubscriptionStatus::Paid))
        .await
        .expect("creates");
    assert!(h.store_is_paid(store_id).await);

    let cancelled = h
        .lifecycle
        .update_status(
            subscription.id,
            SubscriptionStatus::Cancelled,
            None,
            None,
            None,
        )
        .await
        .expect("cancels");

    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(!h.store_is_paid(store_id).await);
}

#[tokio::test]
async fn immediate_cancel_propagates_to_provider() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Cancelling Store");
    let subscription = h
        .lifecycle
        .create_subscription(basic_plan(store_id, SubscriptionStatus::Paid))
        .await
        .expect("creates");

    let cancelled = h
        .lifecycle
        .cancel(subscription.id, true)
        .await
        .expect("cancels");

    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(!h.store_is_paid(store_id).await);
    assert_eq!(
        h.gateway.cancellations(),
        vec![("sub_lifecycle_1".to_owned(), true)]
    );
}

#[tokio::test]
async fn deferred_cancel_takes_effect_at_period_end() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Winding Down Store");

    // A subscription whose current period has already elapsed.
    let mut input = basic_plan(store_id, SubscriptionStatus::Paid);
    input.current_period_start = Utc::now() - Duration::days(31);
    input.current_period_end = Utc::now() - Duration::hours(1);
    let subscription = h
        .lifecycle
        .create_subscription(input)
        .await
        .expect("creates");

    let deferred = h
        .lifecycle
        .cancel(subscription.id, false)
        .await
        .expect("requests cancel");
    assert_eq!(deferred.status, SubscriptionStatus::Paid);
    assert!(deferred.cancel_at_period_end);
    assert_eq!(
        h.gateway.cancellations(),
        vec![("sub_lifecycle_1".to_owned(), false)]
    );

    // The next read applies the pending transition.
    let current = h
        .lifecycle
        .current_subscription_for_store(store_id)
        .await
        .expect("reads")
        .expect("present");
    assert_eq!(current.status, SubscriptionStatus::Cancelled);
    assert!(!h.store_is_paid(store_id).await);
}

#[tokio::test]
async fn store_without_subscription_reads_as_none() {
    let h = BillingHarness::new();
    let store_id = h.seed_store("Fresh Store");

    let current = h
        .lifecycle
        .current_subscription_for_store(store_id)
        .await
        .expect("reads");

    assert!(current.is_none());
}
