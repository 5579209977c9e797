use common::PaymentTransactionId;
use serde::Deserialize;
use serde_json::Value;

use crate::{GatewayError, Result};

/// Checkout lifecycle events the payment saga reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEventKind {
    /// The customer finished the hosted page. `paid` is false only when the
    /// session reports `payment_status: "unpaid"`, which delayed payment
    /// methods do until they settle.
    Completed { paid: bool },
    AsyncPaymentSucceeded,
    AsyncPaymentFailed,
    Expired,
    /// Any other event type. Acknowledged and ignored.
    Other,
}

impl CheckoutEventKind {
    fn from_event(event_type: &str, payment_status: Option<&str>) -> Self {
        match event_type {
            "checkout.session.completed" => CheckoutEventKind::Completed {
                paid: !matches!(payment_status, Some("unpaid")),
            },
            "checkout.session.async_payment_succeeded" => CheckoutEventKind::AsyncPaymentSucceeded,
            "checkout.session.async_payment_failed" => CheckoutEventKind::AsyncPaymentFailed,
            "checkout.session.expired" => CheckoutEventKind::Expired,
            _ => CheckoutEventKind::Other,
        }
    }

    /// The payment outcome this event settles, if any.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self {
            CheckoutEventKind::Completed { paid: true } | CheckoutEventKind::AsyncPaymentSucceeded => {
                Some(PaymentOutcome::Succeeded)
            }
            CheckoutEventKind::Expired | CheckoutEventKind::AsyncPaymentFailed => {
                Some(PaymentOutcome::Failed)
            }
            CheckoutEventKind::Completed { paid: false } | CheckoutEventKind::Other => None,
        }
    }
}

/// Final outcome of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Provider event id.
    pub id: String,
    /// Raw provider event type, e.g. `checkout.session.completed`.
    pub event_type: String,
    pub kind: CheckoutEventKind,
    pub checkout_session_id: Option<String>,
    /// Transaction id echoed back from the session metadata. Always present
    /// for checkout events.
    pub payment_transaction_id: Option<PaymentTransactionId>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawSessionObject,
}

#[derive(Deserialize)]
struct RawSessionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, Value>>,
}

impl WebhookEvent {
    /// Parses a verified webhook body.
    ///
    /// Checkout events must carry a numeric `transaction_id` in the session
    /// metadata; other event types are accepted without it.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let object = raw.data.map(|data| data.object);
        let payment_status = object.as_ref().and_then(|o| o.payment_status.as_deref());
        let kind = CheckoutEventKind::from_event(&raw.event_type, payment_status);

        let payment_transaction_id = object
            .as_ref()
            .and_then(|o| o.metadata.as_ref())
            .and_then(|m| m.get("transaction_id"))
            .map(parse_transaction_id)
            .transpose()?;

        if kind != CheckoutEventKind::Other && payment_transaction_id.is_none() {
            return Err(GatewayError::MalformedPayload(format!(
                "event {} has no transaction_id metadata",
                raw.id
            )));
        }

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            kind,
            checkout_session_id: object.and_then(|o| o.id),
            payment_transaction_id,
        })
    }
}

fn parse_transaction_id(value: &Value) -> Result<PaymentTransactionId> {
    let parsed = match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64().map(PaymentTransactionId::new),
        _ => None,
    };

    parsed.ok_or_else(|| {
        GatewayError::MalformedPayload(format!("invalid transaction_id metadata: {value}"))
    })
}
