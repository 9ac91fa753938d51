//! Integration tests for Clementine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p clementine-integration-tests
//! ```
//!
//! The scenarios here exercise the subscription lifecycle service and the
//! webhook reconciler end to end over the in-memory persistence
//! implementation and a scripted payment provider gateway - no live
//! database or provider account required.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use clementine_billing::db::{InMemoryBilling, StoreDirectory};
use clementine_billing::provider::{
    CheckoutSession, CheckoutSessionRequest, PaymentProviderGateway, ProviderError, ProviderEvent,
    SubscriptionSnapshot,
};
use clementine_billing::services::{SubscriptionLifecycleService, WebhookReconciler};
use clementine_core::{StoreId, UserId};

/// Scripted payment provider gateway.
///
/// Serves configured snapshots keyed by provider subscription ID and records
/// cancellation requests; everything else answers with a canned value.
#[derive(Default)]
pub struct ScriptedGateway {
    snapshots: Mutex<Vec<SubscriptionSnapshot>>,
    cancellations: Mutex<Vec<(String, bool)>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot the gateway will serve.
    pub fn script_snapshot(&self, snapshot: SubscriptionSnapshot) {
        self.snapshots.lock().expect("lock poisoned").push(snapshot);
    }

    /// Cancellation requests seen so far, as `(provider_id, immediate)`.
    #[must_use]
    pub fn cancellations(&self) -> Vec<(String, bool)> {
        self.cancellations.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl PaymentProviderGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        Ok(CheckoutSession {
            url: "https://checkout.test/cs_1".to_owned(),
        })
    }

    async fn subscription_snapshot(
        &self,
        provider_subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        self.snapshots
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::ResourceNotFound(provider_subscription_id.to_owned()))
    }

    fn verify_and_decode_event(
        &self,
        _payload: &[u8],
        _signature_header: &str,
    ) -> Result<ProviderEvent, ProviderError> {
        Err(ProviderError::InvalidSignature(
            "scripted gateway does not verify".to_owned(),
        ))
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

/// A fully wired billing core over in-memory persistence.
pub struct BillingHarness {
    pub billing: Arc<InMemoryBilling>,
    pub gateway: Arc<ScriptedGateway>,
    pub lifecycle: SubscriptionLifecycleService,
    pub reconciler: WebhookReconciler,
}

impl BillingHarness {
    #[must_use]
    pub fn new() -> Self {
        let billing = Arc::new(InMemoryBilling::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let lifecycle = SubscriptionLifecycleService::new(
            billing.clone(),
            billing.clone(),
            gateway.clone(),
        );
        let reconciler = WebhookReconciler::new(lifecycle.clone(), billing.clone(), gateway.clone());

        Self {
            billing,
            gateway,
            lifecycle,
            reconciler,
        }
    }

    /// Seed a store and return its ID.
    #[must_use]
    pub fn seed_store(&self, name: &str) -> StoreId {
        let id = StoreId::generate();
        self.billing.seed_store(id, UserId::generate(), name);
        id
    }

    /// Read back the `is_paid` projection for a store.
    ///
    /// # Panics
    ///
    /// Panics if the store does not exist.
    pub async fn store_is_paid(&self, store_id: StoreId) -> bool {
        self.billing
            .get(store_id)
            .await
            .expect("store lookup")
            .expect("store exists")
            .is_paid
    }
}

impl Default for BillingHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A plausible active-subscription snapshot for `provider_subscription_id`.
#[must_use]
pub fn active_snapshot(provider_subscription_id: &str) -> SubscriptionSnapshot {
    let now = Utc::now();
    SubscriptionSnapshot {
        provider_subscription_id: provider_subscription_id.to_owned(),
        status: "active".to_owned(),
        current_period_start: now,
        current_period_end: now + Duration::days(30),
        price: Decimal::new(29_99, 2),
        plan_id: "price_basic".to_owned(),
        plan_name: "Basic Plan".to_owned(),
        customer_id: "cus_integration".to_owned(),
        next_payment: Some(now + Duration::days(30)),
    }
}

/// A `checkout.session.completed` event in subscription mode.
#[must_use]
pub fn checkout_completed(store_id: StoreId, provider_subscription_id: &str) -> ProviderEvent {
    ProviderEvent::CheckoutSessionCompleted {
        session_id: "cs_integration_1".to_owned(),
        mode: "subscription".to_owned(),
        store_id: Some(store_id.to_string()),
        provider_subscription_id: Some(provider_subscription_id.to_owned()),
        provider_customer_id: Some("cus_integration".to_owned()),
    }
}
