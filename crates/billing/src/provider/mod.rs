//! Payment provider gateway.
//!
//! Abstracts the external payment provider behind [`PaymentProviderGateway`]:
//! checkout session creation, subscription snapshots, webhook verification
//! and decoding, and cancellation. The lifecycle service and webhook
//! reconciler depend only on the trait; [`StripeGateway`] is the production
//! implementation.

pub mod event;
pub mod signature;
pub mod stripe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use clementine_core::StoreId;

pub use event::ProviderEvent;
pub use stripe::StripeGateway;

/// Errors that can occur when interacting with the payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Referenced upstream resource (e.g., a price ID) does not exist.
    #[error("resource not found upstream: {0}")]
    ResourceNotFound(String),

    /// Webhook signature verification failed.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Failed to decode a provider payload.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Request to create a provider-hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Store the resulting subscription will pay for; threaded through the
    /// session metadata so `checkout.session.completed` can find its way back.
    pub store_id: StoreId,
    /// Provider-side price identifier.
    pub price_id: String,
    /// Redirect after successful checkout.
    pub success_url: String,
    /// Redirect after abandoned checkout.
    pub cancel_url: String,
}

/// A provider-hosted checkout flow.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// URL for the customer to complete checkout.
    pub url: String,
}

/// Point-in-time view of a provider-side subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    /// Provider's subscription ID.
    pub provider_subscription_id: String,
    /// Provider's status string (e.g., "active", "canceled").
    pub status: String,
    /// Current billing period start.
    pub current_period_start: DateTime<Utc>,
    /// Current billing period end.
    pub current_period_end: DateTime<Utc>,
    /// Amount charged per period.
    pub price: Decimal,
    /// Provider-side plan/price identifier.
    pub plan_id: String,
    /// Human-readable plan name.
    pub plan_name: String,
    /// Provider's customer ID.
    pub customer_id: String,
    /// Next expected charge, when the provider reports one.
    pub next_payment: Option<DateTime<Utc>>,
}

/// Port for the external payment provider.
#[async_trait]
pub trait PaymentProviderGateway: Send + Sync {
    /// Provider name recorded on subscriptions created through this gateway.
    fn name(&self) -> &str;

    /// Create a checkout session for a store.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ResourceNotFound`] when the price ID does
    /// not exist upstream.
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Fetch the full subscription snapshot from the provider.
    async fn subscription_snapshot(
        &self,
        provider_subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError>;

    /// Verify a webhook signature and decode the payload into a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidSignature`] when verification fails
    /// and [`ProviderError::Decode`] for a payload that verified but does
    /// not parse.
    fn verify_and_decode_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProviderEvent, ProviderError>;

    /// Cancel a provider-side subscription, immediately or at period end.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        immediate: bool,
    ) -> Result<(), ProviderError>;
}
