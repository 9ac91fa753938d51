//! Store visibility repair command.
//!
//! The `is_paid` flag on `billing.store` is written together with every
//! subscription status change, but manual data surgery or a restored backup
//! can leave it stale. `visibility sync` recomputes the projection from the
//! subscription table in one statement.

use super::{ConnectError, connect};

/// Errors that can occur during the visibility sync.
#[derive(Debug, thiserror::Error)]
pub enum VisibilityError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Recompute `is_paid` for every store.
///
/// # Errors
///
/// Returns `VisibilityError` if the database is unreachable.
pub async fn sync() -> Result<(), VisibilityError> {
    let pool = connect("BILLING_DATABASE_URL").await.map_err(|e| match e {
        ConnectError::MissingEnvVar(v) => VisibilityError::MissingEnvVar(v),
        ConnectError::Database(e) => VisibilityError::Database(e),
    })?;

    let result = sqlx::query(
        "UPDATE billing.store s \
         SET is_paid = EXISTS ( \
             SELECT 1 FROM billing.subscription sub \
             WHERE sub.store_id = s.id AND sub.status = 'paid' \
         ), \
             updated_at = now() \
         WHERE is_paid IS DISTINCT FROM EXISTS ( \
             SELECT 1 FROM billing.subscription sub \
             WHERE sub.store_id = s.id AND sub.status = 'paid' \
         )",
    )
    .execute(&pool)
    .await?;

    tracing::info!(repaired = result.rows_affected(), "visibility sync complete");
    Ok(())
}
