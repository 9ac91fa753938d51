//! Payment provider webhook endpoint.
//!
//! Receives the raw request body plus the provider's signature header,
//! verifies and decodes through the gateway, and hands the typed event to
//! the reconciler. Response status is the retry signal: 4xx tells the
//! provider to stop redelivering (bad signature, permanently unprocessable
//! event), 5xx asks for a retry (transient reconciliation failure). Raw
//! failure reasons are logged, never exposed.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::provider::PaymentProviderGateway as _;
use crate::services::ReconcileError;
use crate::state::AppState;

/// Provider signature header.
const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Webhook acknowledgement body.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    received: bool,
}

/// Generic error body; the interesting detail is in the logs.
#[derive(Debug, Serialize)]
struct WebhookError {
    error: &'static str,
}

/// Handle an incoming provider webhook.
///
/// POST /webhooks/billing
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("webhook delivery without a usable signature header");
        return reject(StatusCode::BAD_REQUEST);
    };

    let event = match state.gateway().verify_and_decode_event(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "webhook verification failed");
            return reject(StatusCode::BAD_REQUEST);
        }
    };

    match state.reconciler().execute(event).await {
        // The reconciler logged the failure; pick the retry signal here.
        Err(ReconcileError::MissingMetadata(_)) => reject(StatusCode::BAD_REQUEST),
        Err(_) => reject(StatusCode::INTERNAL_SERVER_ERROR),
        Ok(_) => (StatusCode::OK, Json(WebhookResponse { received: true })).into_response(),
    }
}

fn reject(status: StatusCode) -> Response {
    (
        status,
        Json(WebhookError {
            error: "webhook processing failed",
        }),
    )
        .into_response()
}
