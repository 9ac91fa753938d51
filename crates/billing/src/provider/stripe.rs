//! Stripe implementation of the payment provider gateway.
//!
//! Talks to the Stripe REST API with form-encoded requests and decodes the
//! subset of response fields the billing core consumes.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::event::unix_ts;
use super::{
    CheckoutSession, CheckoutSessionRequest, PaymentProviderGateway, ProviderError, ProviderEvent,
    SubscriptionSnapshot, event, signature,
};
use crate::config::ProviderConfig;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    webhook_secret: SecretString,
}

impl StripeGateway {
    /// Create a new Stripe gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| ProviderError::Decode(format!("invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Map a non-success Stripe response to a [`ProviderError`].
    ///
    /// Stripe reports unknown IDs as `resource_missing`; those become
    /// [`ProviderError::ResourceNotFound`] so callers can distinguish "you
    /// asked for something that does not exist" from a provider outage.
    async fn error_from_response(
        resource: &str,
        response: reqwest::Response,
    ) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        #[derive(Deserialize)]
        struct ErrorBody {
            error: ErrorDetail,
        }
        #[derive(Deserialize)]
        struct ErrorDetail {
            code: Option<String>,
            message: Option<String>,
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            if parsed.error.code.as_deref() == Some("resource_missing") || status == 404 {
                return ProviderError::ResourceNotFound(resource.to_owned());
            }
            return ProviderError::Api {
                status,
                message: parsed.error.message.unwrap_or_default(),
            };
        }

        ProviderError::Api {
            status,
            message: body,
        }
    }
}

#[derive(Deserialize)]
struct ApiCheckoutSession {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiSubscription {
    id: String,
    status: String,
    customer: String,
    current_period_start: i64,
    current_period_end: i64,
    items: ApiSubscriptionItems,
}

#[derive(Deserialize)]
struct ApiSubscriptionItems {
    data: Vec<ApiSubscriptionItem>,
}

#[derive(Deserialize)]
struct ApiSubscriptionItem {
    price: ApiPrice,
}

#[derive(Deserialize)]
struct ApiPrice {
    id: String,
    /// Amount in the smallest currency unit (cents).
    unit_amount: Option<i64>,
    nickname: Option<String>,
}

#[async_trait]
impl PaymentProviderGateway for StripeGateway {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let store_id = request.store_id.to_string();

        // The store ID rides on both the session and the subscription it
        // creates, so every later webhook can be correlated back.
        let form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("success_url", &request.success_url),
            ("cancel_url", &request.cancel_url),
            ("line_items[0][price]", &request.price_id),
            ("line_items[0][quantity]", "1"),
            ("metadata[store_id]", &store_id),
            ("subscription_data[metadata][store_id]", &store_id),
        ];

        let response = self.client.post(&url).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(&request.price_id, response).await);
        }

        let session: ApiCheckoutSession = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| ProviderError::Decode("checkout session has no url".to_owned()))?;

        Ok(CheckoutSession { url })
    }

    async fn subscription_snapshot(
        &self,
        provider_subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        let url = format!("{}/v1/subscriptions/{provider_subscription_id}", self.api_base);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(provider_subscription_id, response).await);
        }

        let api: ApiSubscription = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let item = api.items.data.into_iter().next().ok_or_else(|| {
            ProviderError::Decode(format!("subscription {} has no items", api.id))
        })?;

        let cents = item.price.unit_amount.unwrap_or_default();
        let current_period_end = unix_ts(api.current_period_end)?;
        // Stripe has no dedicated "next charge" field on the subscription
        // itself; for an active subscription the next charge lands at the
        // period boundary.
        let next_payment = (api.status == "active").then_some(current_period_end);

        Ok(SubscriptionSnapshot {
            provider_subscription_id: api.id,
            status: api.status,
            current_period_start: unix_ts(api.current_period_start)?,
            current_period_end,
            price: Decimal::new(cents, 2),
            plan_name: item
                .price
                .nickname
                .unwrap_or_else(|| item.price.id.clone()),
            plan_id: item.price.id,
            customer_id: api.customer,
            next_payment,
        })
    }

    fn verify_and_decode_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ProviderEvent, ProviderError> {
        signature::verify(
            payload,
            signature_header,
            self.webhook_secret.expose_secret(),
            Utc::now(),
        )?;
        event::decode(payload)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        immediate: bool,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/v1/subscriptions/{provider_subscription_id}", self.api_base);

        let response = if immediate {
            self.client.delete(&url).send().await?
        } else {
            self.client
                .post(&url)
                .form(&[("cancel_at_period_end", "true")])
                .send()
                .await?
        };

        if !response.status().is_success() {
            return Err(Self::error_from_response(provider_subscription_id, response).await);
        }

        Ok(())
    }
}
