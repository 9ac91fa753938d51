//! Persistence layer for billing `PostgreSQL`.
//!
//! # Database schema: `billing`
//!
//! ## Tables
//!
//! - `store` - Tenant stores with the denormalized `is_paid` projection
//! - `subscription` - Local subscription records (partial unique index on
//!   `provider_subscription_id`)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/billing/migrations/` and run via:
//! ```bash
//! cargo run -p clementine-cli -- migrate billing
//! ```
//!
//! # Abstractions
//!
//! The [`SubscriptionStore`] and [`StoreDirectory`] traits are the seams the
//! lifecycle service and webhook reconciler are built against. Production
//! wiring injects the `Pg*` implementations; tests use
//! [`memory::InMemoryBilling`].

pub mod memory;
pub mod stores;
pub mod subscriptions;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use clementine_core::{StoreId, SubscriptionId};

use crate::models::{NewSubscription, StatusChange, Store, Subscription};

pub use memory::InMemoryBilling;
pub use stores::PgStoreDirectory;
pub use subscriptions::PgSubscriptionStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate `provider_subscription_id`).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Persistence abstraction for [`Subscription`] records.
///
/// Implementations own the consistency obligations of the billing core:
/// `insert` must fail with [`RepositoryError::Conflict`] when the
/// `provider_subscription_id` is already recorded (backed by a unique index,
/// not just an application-level check), and both `insert` and
/// `apply_change` must write the subscription row and the owning store's
/// `is_paid` flag as a single atomic unit.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Look up a subscription by its local ID.
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError>;

    /// Look up a subscription by the provider's correlation ID.
    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError>;

    /// The store's current subscription, preferring a non-cancelled one.
    async fn find_by_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Subscription>, RepositoryError>;

    /// Persist a new subscription row, syncing the owning store's `is_paid`
    /// flag when the initial status grants visibility.
    async fn insert(&self, new: NewSubscription) -> Result<Subscription, RepositoryError>;

    /// Apply a status change, syncing the owning store's `is_paid` flag in
    /// the same transaction.
    async fn apply_change(
        &self,
        id: SubscriptionId,
        change: StatusChange,
    ) -> Result<Subscription, RepositoryError>;
}

/// Persistence abstraction for [`Store`] records.
///
/// Exposes the read/update surface of the `is_paid` projection. Lifecycle
/// operations never call `set_paid` directly - the paired write lives in
/// [`SubscriptionStore`] - but repair tooling and tests do.
#[async_trait]
pub trait StoreDirectory: Send + Sync {
    /// Look up a store by ID.
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    /// Overwrite the `is_paid` projection for a store.
    async fn set_paid(&self, id: StoreId, is_paid: bool) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
