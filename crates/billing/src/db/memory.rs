//! In-memory implementations of the billing persistence traits.
//!
//! A single mutex guards both tables, which makes the "subscription status
//! and store flag move together" rule trivially atomic. Used by unit and
//! scenario tests, and handy for local development without `PostgreSQL`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use clementine_core::{StoreId, SubscriptionId, UserId};

use super::{RepositoryError, StoreDirectory, SubscriptionStore};
use crate::models::{NewSubscription, StatusChange, Store, Subscription};

#[derive(Default)]
struct State {
    stores: HashMap<StoreId, Store>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

/// In-memory [`SubscriptionStore`] + [`StoreDirectory`].
#[derive(Default)]
pub struct InMemoryBilling {
    state: Mutex<State>,
}

impl InMemoryBilling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a store directly, bypassing any lifecycle logic.
    pub fn seed_store(&self, id: StoreId, owner_user_id: UserId, name: &str) {
        let now = Utc::now();
        self.lock().stores.insert(
            id,
            Store {
                id,
                owner_user_id,
                name: name.to_owned(),
                is_paid: false,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Number of subscription rows currently held.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("billing state lock poisoned")
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryBilling {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError> {
        Ok(self.lock().subscriptions.get(&id).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        Ok(self
            .lock()
            .subscriptions
            .values()
            .find(|s| {
                s.provider_subscription_id.as_deref() == Some(provider_subscription_id)
            })
            .cloned())
    }

    async fn find_by_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let state = self.lock();
        let mut candidates: Vec<&Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.store_id == store_id)
            .collect();
        // Same ordering as the SQL implementation: live subscriptions first,
        // newest first within each group.
        candidates.sort_by_key(|s| {
            (
                s.status == clementine_core::SubscriptionStatus::Cancelled,
                std::cmp::Reverse(s.created_at),
            )
        });
        Ok(candidates.first().map(|s| (*s).clone()))
    }

    async fn insert(&self, new: NewSubscription) -> Result<Subscription, RepositoryError> {
        let mut state = self.lock();

        if let Some(provider_id) = &new.provider_subscription_id
            && state
                .subscriptions
                .values()
                .any(|s| s.provider_subscription_id.as_deref() == Some(provider_id))
        {
            return Err(RepositoryError::Conflict(
                "provider subscription already recorded".to_owned(),
            ));
        }

        let now = Utc::now();
        let subscription = Subscription {
            id: SubscriptionId::generate(),
            store_id: new.store_id,
            plan_name: new.plan_name,
            plan_id: new.plan_id,
            provider: new.provider,
            current_period_start: new.current_period_start,
            current_period_end: new.current_period_end,
            price: new.price,
            status: new.status,
            cancel_at_period_end: false,
            next_payment: new.next_payment,
            provider_subscription_id: new.provider_subscription_id,
            provider_customer_id: new.provider_customer_id,
            created_at: now,
            updated_at: now,
        };

        if subscription.status.grants_visibility()
            && let Some(store) = state.stores.get_mut(&subscription.store_id)
        {
            store.is_paid = true;
            store.updated_at = now;
        }

        state
            .subscriptions
            .insert(subscription.id, subscription.clone());

        Ok(subscription)
    }

    async fn apply_change(
        &self,
        id: SubscriptionId,
        change: StatusChange,
    ) -> Result<Subscription, RepositoryError> {
        let mut state = self.lock();
        let now = Utc::now();

        let subscription = state
            .subscriptions
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;

        subscription.status = change.status;
        if let Some(start) = change.current_period_start {
            subscription.current_period_start = start;
        }
        if let Some(end) = change.current_period_end {
            subscription.current_period_end = end;
        }
        if let Some(next) = change.next_payment {
            subscription.next_payment = Some(next);
        }
        if let Some(flag) = change.cancel_at_period_end {
            subscription.cancel_at_period_end = flag;
        }
        subscription.updated_at = now;

        let updated = subscription.clone();

        if let Some(store) = state.stores.get_mut(&updated.store_id) {
            store.is_paid = change.status.grants_visibility();
            store.updated_at = now;
        }

        Ok(updated)
    }
}

#[async_trait]
impl StoreDirectory for InMemoryBilling {
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.lock().stores.get(&id).cloned())
    }

    async fn set_paid(&self, id: StoreId, is_paid: bool) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let store = state.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        store.is_paid = is_paid;
        store.updated_at = Utc::now();
        Ok(())
    }
}
