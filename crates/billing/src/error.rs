//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::provider::ProviderError;
use crate::services::LifecycleError;

/// Application-level error type for the billing service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Payment provider operation failed.
    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Subscription lifecycle operation failed.
    #[error("Billing error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error is a server-side fault worth a Sentry event.
    fn is_server_fault(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Provider(_) => true,
            Self::Lifecycle(err) => matches!(
                err,
                LifecycleError::Repository(_) | LifecycleError::Provider(_)
            ),
            Self::NotFound(_) | Self::BadRequest(_) => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_fault() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Lifecycle(err) => match err {
                LifecycleError::StoreNotFound(_) | LifecycleError::SubscriptionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LifecycleError::InvalidTransition { .. } => StatusCode::CONFLICT,
                LifecycleError::Provider(_) => StatusCode::BAD_GATEWAY,
                LifecycleError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Provider(_) => "Payment provider error".to_string(),
            Self::Lifecycle(err) => match err {
                LifecycleError::StoreNotFound(_) => "Store not found".to_string(),
                LifecycleError::SubscriptionNotFound(_) => "Subscription not found".to_string(),
                LifecycleError::InvalidTransition { from, to } => {
                    format!("Invalid status transition: {from} -> {to}")
                }
                LifecycleError::Provider(_) => "Payment provider error".to_string(),
                LifecycleError::Repository(_) => "Internal server error".to_string(),
            },
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
