//! Billing API routes.
//!
//! JSON endpoints for checkout session creation, cancellation, and
//! subscription lookup by store.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use url::Url;

use clementine_core::{StoreId, SubscriptionId};

use crate::db::StoreDirectory as _;
use crate::error::{AppError, Result};
use crate::models::Subscription;
use crate::provider::CheckoutSessionRequest;
use crate::state::AppState;

/// Request to create a provider-hosted checkout session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    pub store_id: StoreId,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Response from creating a checkout session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionResponse {
    pub checkout_url: String,
}

/// Create a checkout session for a store.
///
/// POST /api/billing/checkout-session
///
/// # Errors
///
/// Returns 404 when the store does not exist and a sanitized 5xx-class
/// error on provider failures (e.g., an unknown price ID).
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CreateCheckoutSessionResponse>> {
    for (name, value) in [
        ("successUrl", &request.success_url),
        ("cancelUrl", &request.cancel_url),
    ] {
        Url::parse(value).map_err(|e| AppError::BadRequest(format!("invalid {name}: {e}")))?;
    }

    let store = state
        .stores()
        .get(request.store_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {}", request.store_id)))?;

    let session = state
        .gateway()
        .create_checkout_session(CheckoutSessionRequest {
            store_id: store.id,
            price_id: request.price_id,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
        })
        .await?;

    Ok(Json(CreateCheckoutSessionResponse {
        checkout_url: session.url,
    }))
}

/// Query parameters for cancellation.
#[derive(Debug, Deserialize)]
pub struct CancelParams {
    /// Cancel now instead of at the end of the current period.
    #[serde(default)]
    pub immediately: bool,
}

/// Response wrapping a single subscription.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Subscription,
}

/// Cancel a subscription.
///
/// POST /api/billing/subscriptions/{id}/cancel?immediately=bool
///
/// # Errors
///
/// Returns 404 when the subscription does not exist.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<SubscriptionId>,
    Query(params): Query<CancelParams>,
) -> Result<Json<SubscriptionResponse>> {
    let subscription = state.lifecycle().cancel(id, params.immediately).await?;

    Ok(Json(SubscriptionResponse { subscription }))
}

/// Response wrapping an optional subscription.
#[derive(Debug, Serialize)]
pub struct StoreSubscriptionResponse {
    pub subscription: Option<Subscription>,
}

/// Current subscription for a store, if any.
///
/// GET /api/billing/stores/{store_id}/subscription
///
/// # Errors
///
/// Returns 404 when the store does not exist.
pub async fn find_by_store(
    State(state): State<AppState>,
    Path(store_id): Path<StoreId>,
) -> Result<Json<StoreSubscriptionResponse>> {
    state
        .stores()
        .get(store_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {store_id}")))?;

    let subscription = state
        .lifecycle()
        .current_subscription_for_store(store_id)
        .await?;

    Ok(Json(StoreSubscriptionResponse { subscription }))
}
