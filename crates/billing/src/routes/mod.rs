//! HTTP route handlers for the billing service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (verifies database)
//!
//! # Provider webhooks
//! POST /webhooks/billing       - Signed payment provider events
//!
//! # Billing API
//! POST /api/billing/checkout-session                   - Create a provider-hosted checkout
//! POST /api/billing/subscriptions/{id}/cancel          - Cancel a subscription
//! GET  /api/billing/stores/{store_id}/subscription     - Current subscription for a store
//! ```

pub mod subscriptions;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the provider webhook router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/billing", post(webhooks::receive))
}

/// Create the billing API router.
pub fn billing_api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout-session",
            post(subscriptions::create_checkout_session),
        )
        .route(
            "/subscriptions/{id}/cancel",
            post(subscriptions::cancel),
        )
        .route(
            "/stores/{store_id}/subscription",
            get(subscriptions::find_by_store),
        )
}

/// Create the complete route tree.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/webhooks", webhook_routes())
        .nest("/api/billing", billing_api_routes())
}
