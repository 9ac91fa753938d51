//! CLI command implementations.

pub mod migrate;
pub mod visibility;

use sqlx::PgPool;

/// Errors shared by command database connections.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect to the database named by `primary_key`, falling back to the
/// generic `DATABASE_URL`.
async fn connect(primary_key: &'static str) -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| ConnectError::MissingEnvVar(primary_key))?;

    tracing::info!("Connecting to database...");
    Ok(PgPool::connect(&database_url).await?)
}
