//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! cl-cli migrate billing
//! ```
//!
//! # Environment Variables
//!
//! - `BILLING_DATABASE_URL` - `PostgreSQL` connection string for billing
//!   (falls back to `DATABASE_URL`)

use sqlx::PgPool;

use super::connect;

/// Errors that can occur during migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run billing database migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration
/// fails to apply.
pub async fn billing() -> Result<(), MigrationError> {
    let pool: PgPool = connect("BILLING_DATABASE_URL")
        .await
        .map_err(|e| match e {
            super::ConnectError::MissingEnvVar(v) => MigrationError::MissingEnvVar(v),
            super::ConnectError::Database(e) => MigrationError::Database(e),
        })?;

    tracing::info!("Running billing migrations...");
    sqlx::migrate!("../billing/migrations").run(&pool).await?;

    tracing::info!("Billing migrations complete!");
    Ok(())
}
