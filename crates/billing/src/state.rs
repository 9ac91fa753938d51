//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::BillingConfig;
use crate::db::{StoreDirectory, SubscriptionStore};
use crate::provider::PaymentProviderGateway;
use crate::services::{SubscriptionLifecycleService, WebhookReconciler};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to shared
/// resources. The persistence stores and the provider gateway are
/// constructed once at process start and injected here; the lifecycle
/// service and webhook reconciler are wired from them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BillingConfig,
    pool: PgPool,
    stores: Arc<dyn StoreDirectory>,
    gateway: Arc<dyn PaymentProviderGateway>,
    lifecycle: SubscriptionLifecycleService,
    reconciler: WebhookReconciler,
}

impl AppState {
    /// Create a new application state from injected collaborators.
    #[must_use]
    pub fn new(
        config: BillingConfig,
        pool: PgPool,
        subscriptions: Arc<dyn SubscriptionStore>,
        stores: Arc<dyn StoreDirectory>,
        gateway: Arc<dyn PaymentProviderGateway>,
    ) -> Self {
        let lifecycle = SubscriptionLifecycleService::new(
            subscriptions.clone(),
            stores.clone(),
            gateway.clone(),
        );
        let reconciler = WebhookReconciler::new(lifecycle.clone(), subscriptions, gateway.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stores,
                gateway,
                lifecycle,
                reconciler,
            }),
        }
    }

    /// Get a reference to the billing configuration.
    #[must_use]
    pub fn config(&self) -> &BillingConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the store directory.
    #[must_use]
    pub fn stores(&self) -> &Arc<dyn StoreDirectory> {
        &self.inner.stores
    }

    /// Get a reference to the payment provider gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn PaymentProviderGateway> {
        &self.inner.gateway
    }

    /// Get a reference to the subscription lifecycle service.
    #[must_use]
    pub fn lifecycle(&self) -> &SubscriptionLifecycleService {
        &self.inner.lifecycle
    }

    /// Get a reference to the webhook reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler {
        &self.inner.reconciler
    }
}
