//! Subscription repository for database operations.
//!
//! The queries here are the storage half of the billing consistency rules:
//! the partial unique index on `provider_subscription_id` turns a lost
//! check-then-insert race into a clean [`RepositoryError::Conflict`], and
//! every status write updates the owning store's `is_paid` flag inside the
//! same transaction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use clementine_core::{StoreId, SubscriptionId, SubscriptionStatus};

use super::{RepositoryError, SubscriptionStore};
use crate::models::{NewSubscription, StatusChange, Subscription};

const SUBSCRIPTION_COLUMNS: &str = "id, store_id, plan_name, plan_id, provider, \
     current_period_start, current_period_end, price, status, cancel_at_period_end, \
     next_payment, provider_subscription_id, provider_customer_id, created_at, updated_at";

/// `PostgreSQL`-backed [`SubscriptionStore`].
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    /// Create a new subscription repository over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw database row, converted into the domain type via `into_domain`.
#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    store_id: Uuid,
    plan_name: String,
    plan_id: String,
    provider: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    price: Decimal,
    status: String,
    cancel_at_period_end: bool,
    next_payment: Option<DateTime<Utc>>,
    provider_subscription_id: Option<String>,
    provider_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_domain(self) -> Result<Subscription, RepositoryError> {
        let status = SubscriptionStatus::from_str(&self.status).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid status in database: {e}"))
        })?;

        Ok(Subscription {
            id: SubscriptionId::new(self.id),
            store_id: StoreId::new(self.store_id),
            plan_name: self.plan_name,
            plan_id: self.plan_id,
            provider: self.provider,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            price: self.price,
            status,
            cancel_at_period_end: self.cancel_at_period_end,
            next_payment: self.next_payment,
            provider_subscription_id: self.provider_subscription_id,
            provider_customer_id: self.provider_customer_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM billing.subscription WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM billing.subscription \
             WHERE provider_subscription_id = $1"
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn find_by_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        // Prefer a live subscription; fall back to the newest cancelled one.
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM billing.subscription \
             WHERE store_id = $1 \
             ORDER BY (status = 'cancelled') ASC, created_at DESC \
             LIMIT 1"
        ))
        .bind(store_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn insert(&self, new: NewSubscription) -> Result<Subscription, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO billing.subscription \
                 (id, store_id, plan_name, plan_id, provider, current_period_start, \
                  current_period_end, price, status, next_payment, \
                  provider_subscription_id, provider_customer_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(SubscriptionId::generate().as_uuid())
        .bind(new.store_id.as_uuid())
        .bind(&new.plan_name)
        .bind(&new.plan_id)
        .bind(&new.provider)
        .bind(new.current_period_start)
        .bind(new.current_period_end)
        .bind(new.price)
        .bind(new.status.to_string())
        .bind(new.next_payment)
        .bind(&new.provider_subscription_id)
        .bind(&new.provider_customer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(
                    "provider subscription already recorded".to_owned(),
                );
            }
            RepositoryError::Database(e)
        })?;

        if new.status.grants_visibility() {
            sqlx::query(
                "UPDATE billing.store SET is_paid = TRUE, updated_at = now() WHERE id = $1",
            )
            .bind(new.store_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_domain()
    }

    async fn apply_change(
        &self,
        id: SubscriptionId,
        change: StatusChange,
    ) -> Result<Subscription, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE billing.subscription \
             SET status = $2, \
                 current_period_start = COALESCE($3, current_period_start), \
                 current_period_end = COALESCE($4, current_period_end), \
                 next_payment = COALESCE($5, next_payment), \
                 cancel_at_period_end = COALESCE($6, cancel_at_period_end), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(change.status.to_string())
        .bind(change.current_period_start)
        .bind(change.current_period_end)
        .bind(change.next_payment)
        .bind(change.cancel_at_period_end)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query("UPDATE billing.store SET is_paid = $2, updated_at = now() WHERE id = $1")
            .bind(row.store_id)
            .bind(change.status.grants_visibility())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row.into_domain()
    }
}
