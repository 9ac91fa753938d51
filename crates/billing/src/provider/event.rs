//! Typed provider webhook events.
//!
//! The provider's JSON envelope (`{"type": "...", "data": {"object": ...}}`)
//! is decoded into the closed [`ProviderEvent`] sum type. Event kinds this
//! system does not consume land in the explicit [`ProviderEvent::Unrecognized`]
//! arm so new provider event types route visibly to a no-op instead of
//! failing deliveries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ProviderError;

/// A verified, decoded webhook event.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A checkout flow finished; `store_id` comes from the session metadata.
    CheckoutSessionCompleted {
        session_id: String,
        /// Checkout mode ("subscription", "payment", ...). Only
        /// subscription-mode sessions drive subscription creation.
        mode: String,
        /// Raw `store_id` metadata value, if the session carried one.
        store_id: Option<String>,
        provider_subscription_id: Option<String>,
        provider_customer_id: Option<String>,
    },
    /// Provider-side subscription came into existence.
    SubscriptionCreated(SubscriptionEvent),
    /// Provider-side subscription changed (status, period, schedule).
    SubscriptionUpdated(SubscriptionEvent),
    /// Provider-side subscription ended.
    SubscriptionDeleted { provider_subscription_id: String },
    /// An invoice for a subscription was paid.
    InvoicePaymentSucceeded(InvoiceEvent),
    /// An invoice charge attempt failed.
    InvoicePaymentFailed(InvoiceEvent),
    /// Any event kind this system does not consume.
    Unrecognized { kind: String },
}

/// Payload of `customer.subscription.*` events.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub provider_subscription_id: String,
    /// Provider's status string (e.g., "active", "canceled", "past_due").
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// Payload of `invoice.payment_*` events.
#[derive(Debug, Clone)]
pub struct InvoiceEvent {
    /// Subscription the invoice belongs to; absent for one-off invoices.
    pub provider_subscription_id: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
    pub next_payment: Option<DateTime<Utc>>,
}

impl ProviderEvent {
    /// Event kind as the provider names it, for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted { .. } => "checkout.session.completed",
            Self::SubscriptionCreated(_) => "customer.subscription.created",
            Self::SubscriptionUpdated(_) => "customer.subscription.updated",
            Self::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            Self::InvoicePaymentSucceeded(_) => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed(_) => "invoice.payment_failed",
            Self::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    subscription: Option<String>,
    customer: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
}

#[derive(Deserialize)]
struct InvoiceObject {
    subscription: Option<String>,
    period_end: Option<i64>,
    next_payment_attempt: Option<i64>,
}

/// Decode a raw (already signature-verified) payload into a typed event.
///
/// # Errors
///
/// Returns [`ProviderError::Decode`] when the envelope or a known event
/// kind's object does not parse. Unknown kinds decode successfully into
/// [`ProviderEvent::Unrecognized`].
pub fn decode(payload: &[u8]) -> Result<ProviderEvent, ProviderError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| ProviderError::Decode(format!("invalid event envelope: {e}")))?;

    match envelope.kind.as_str() {
        "checkout.session.completed" => {
            let mut object: CheckoutSessionObject = parse_object(envelope.data.object)?;
            // The dashboard-configured metadata key has changed spelling over
            // time; accept both.
            let store_id = object
                .metadata
                .remove("store_id")
                .or_else(|| object.metadata.remove("storeId"));
            Ok(ProviderEvent::CheckoutSessionCompleted {
                session_id: object.id,
                mode: object.mode,
                store_id,
                provider_subscription_id: object.subscription,
                provider_customer_id: object.customer,
            })
        }
        "customer.subscription.created" => Ok(ProviderEvent::SubscriptionCreated(
            subscription_event(envelope.data.object)?,
        )),
        "customer.subscription.updated" => Ok(ProviderEvent::SubscriptionUpdated(
            subscription_event(envelope.data.object)?,
        )),
        "customer.subscription.deleted" => {
            let object: SubscriptionObject = parse_object(envelope.data.object)?;
            Ok(ProviderEvent::SubscriptionDeleted {
                provider_subscription_id: object.id,
            })
        }
        "invoice.payment_succeeded" => Ok(ProviderEvent::InvoicePaymentSucceeded(invoice_event(
            envelope.data.object,
        )?)),
        "invoice.payment_failed" => Ok(ProviderEvent::InvoicePaymentFailed(invoice_event(
            envelope.data.object,
        )?)),
        other => Ok(ProviderEvent::Unrecognized {
            kind: other.to_owned(),
        }),
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(
    object: serde_json::Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(object)
        .map_err(|e| ProviderError::Decode(format!("invalid event object: {e}")))
}

fn subscription_event(object: serde_json::Value) -> Result<SubscriptionEvent, ProviderError> {
    let object: SubscriptionObject = parse_object(object)?;
    Ok(SubscriptionEvent {
        provider_subscription_id: object.id,
        status: object.status,
        current_period_start: object.current_period_start.map(unix_ts).transpose()?,
        current_period_end: object.current_period_end.map(unix_ts).transpose()?,
        cancel_at_period_end: object.cancel_at_period_end,
    })
}

fn invoice_event(object: serde_json::Value) -> Result<InvoiceEvent, ProviderError> {
    let object: InvoiceObject = parse_object(object)?;
    Ok(InvoiceEvent {
        provider_subscription_id: object.subscription,
        period_end: object.period_end.map(unix_ts).transpose()?,
        next_payment: object.next_payment_attempt.map(unix_ts).transpose()?,
    })
}

/// Provider timestamps are unix seconds.
pub(crate) fn unix_ts(secs: i64) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| ProviderError::Decode(format!("timestamp out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_json(value: serde_json::Value) -> ProviderEvent {
        decode(value.to_string().as_bytes()).expect("decodes")
    }

    #[test]
    fn test_decode_checkout_session_completed() {
        let event = decode_json(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "mode": "subscription",
                "metadata": {"store_id": "5f6f4e40-9f3f-4e0a-95a2-2f8c3f8f2bb1"},
                "subscription": "sub_1",
                "customer": "cus_1"
            }}
        }));

        match event {
            ProviderEvent::CheckoutSessionCompleted {
                session_id,
                mode,
                store_id,
                provider_subscription_id,
                provider_customer_id,
            } => {
                assert_eq!(session_id, "cs_test_1");
                assert_eq!(mode, "subscription");
                assert_eq!(store_id.as_deref(), Some("5f6f4e40-9f3f-4e0a-95a2-2f8c3f8f2bb1"));
                assert_eq!(provider_subscription_id.as_deref(), Some("sub_1"));
                assert_eq!(provider_customer_id.as_deref(), Some("cus_1"));
            }
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_checkout_accepts_camel_case_metadata_key() {
        let event = decode_json(json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_2",
                "mode": "subscription",
                "metadata": {"storeId": "abc"},
                "subscription": "sub_2"
            }}
        }));

        match event {
            ProviderEvent::CheckoutSessionCompleted { store_id, .. } => {
                assert_eq!(store_id.as_deref(), Some("abc"));
            }
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_checkout_without_metadata() {
        let event = decode_json(json!({
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_3", "mode": "subscription"}}
        }));

        match event {
            ProviderEvent::CheckoutSessionCompleted { store_id, .. } => {
                assert!(store_id.is_none());
            }
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_subscription_updated() {
        let event = decode_json(json!({
            "type": "customer.subscription.updated",
            "data": {"object": {
                "id": "sub_1",
                "status": "active",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "cancel_at_period_end": false
            }}
        }));

        match event {
            ProviderEvent::SubscriptionUpdated(e) => {
                assert_eq!(e.provider_subscription_id, "sub_1");
                assert_eq!(e.status, "active");
                assert_eq!(
                    e.current_period_start.map(|t| t.timestamp()),
                    Some(1_700_000_000)
                );
            }
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_subscription_deleted() {
        let event = decode_json(json!({
            "type": "customer.subscription.deleted",
            "data": {"object": {"id": "sub_9", "status": "canceled"}}
        }));

        match event {
            ProviderEvent::SubscriptionDeleted {
                provider_subscription_id,
            } => assert_eq!(provider_subscription_id, "sub_9"),
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_invoice_events() {
        let succeeded = decode_json(json!({
            "type": "invoice.payment_succeeded",
            "data": {"object": {
                "subscription": "sub_1",
                "period_end": 1_702_592_000,
                "next_payment_attempt": null
            }}
        }));
        assert!(matches!(
            succeeded,
            ProviderEvent::InvoicePaymentSucceeded(InvoiceEvent {
                ref provider_subscription_id,
                ..
            }) if provider_subscription_id.as_deref() == Some("sub_1")
        ));

        let failed = decode_json(json!({
            "type": "invoice.payment_failed",
            "data": {"object": {"subscription": "sub_1", "next_payment_attempt": 1_702_700_000}}
        }));
        match failed {
            ProviderEvent::InvoicePaymentFailed(e) => {
                assert_eq!(e.next_payment.map(|t| t.timestamp()), Some(1_702_700_000));
            }
            other => panic!("wrong event kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_unrecognized_kind() {
        let event = decode_json(json!({
            "type": "customer.subscription.trial_will_end",
            "data": {"object": {"id": "sub_1"}}
        }));
        assert!(matches!(
            event,
            ProviderEvent::Unrecognized { ref kind } if kind == "customer.subscription.trial_will_end"
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn test_decode_rejects_known_kind_with_bad_object() {
        let result = decode(
            json!({
                "type": "customer.subscription.updated",
                "data": {"object": {"status": "active"}}
            })
            .to_string()
            .as_bytes(),
        );
        assert!(matches!(result, Err(ProviderError::Decode(_))));
    }
}
