//! Store repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use clementine_core::{StoreId, UserId};

use super::{RepositoryError, StoreDirectory};
use crate::models::Store;

/// `PostgreSQL`-backed [`StoreDirectory`].
#[derive(Clone)]
pub struct PgStoreDirectory {
    pool: PgPool,
}

impl PgStoreDirectory {
    /// Create a new store repository over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    owner_user_id: Uuid,
    name: String,
    is_paid: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: StoreId::new(row.id),
            owner_user_id: UserId::new(row.owner_user_id),
            name: row.name,
            is_paid: row.is_paid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl StoreDirectory for PgStoreDirectory {
    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            "SELECT id, owner_user_id, name, is_paid, created_at, updated_at \
             FROM billing.store WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Store::from))
    }

    async fn set_paid(&self, id: StoreId, is_paid: bool) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE billing.store SET is_paid = $2, updated_at = now() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(is_paid)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
