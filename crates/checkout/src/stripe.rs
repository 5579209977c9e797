use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::{
    CheckoutSessionGateway, CheckoutSessionRequest, CreatedCheckoutSession, GatewayError,
    LINE_ITEM_NAME, Result, WebhookEvent, WebhookVerifier,
};

/// Default Stripe API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Connection settings for the Stripe gateway.
#[derive(Clone)]
pub struct StripeConfig {
    pub api_key: String,
    pub api_base: String,
    pub webhook_secret: String,
    pub webhook_tolerance: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Checkout gateway backed by Stripe Checkout Sessions.
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    client: Client,
    api_key: String,
    api_base: String,
    verifier: WebhookVerifier,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeCheckoutGateway {
    pub fn new(config: StripeConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            api_key: config.api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            verifier: WebhookVerifier::new(config.webhook_secret)
                .with_tolerance(config.webhook_tolerance),
        })
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);

        Err(GatewayError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

/// Encodes a session request as Stripe form parameters.
pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            LINE_ITEM_NAME.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][description]".to_string(),
            request.description(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.amount.to_string(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "metadata[transaction_id]".to_string(),
            request.payment_transaction_id.to_string(),
        ),
        ("metadata[user_id]".to_string(), request.user_id.to_string()),
        (
            "metadata[booking_id]".to_string(),
            request.booking_id.to_string(),
        ),
        (
            "expires_at".to_string(),
            request.expires_at.timestamp().to_string(),
        ),
    ];

    if let Some(url) = &request.success_url {
        form.push(("success_url".to_string(), url.clone()));
    }
    if let Some(url) = &request.cancel_url {
        form.push(("cancel_url".to_string(), url.clone()));
    }

    form
}

#[async_trait]
impl CheckoutSessionGateway for StripeCheckoutGateway {
    #[tracing::instrument(skip(self, request), fields(payment_transaction_id = %request.payment_transaction_id))]
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedCheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.api_key)
            .form(&session_form(request))
            .send()
            .await?;

        let session: SessionResponse = Self::check(response).await?.json().await?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::MissingUrl(session.id.clone()))?;

        tracing::debug!(external_session_id = %session.id, "checkout session created");

        Ok(CreatedCheckoutSession {
            external_session_id: session.id,
            url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_session(&self, external_session_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/v1/checkout/sessions/{}/expire",
                self.api_base, external_session_id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.verifier.verify(payload, signature)?;
        WebhookEvent::parse(payload)
    }
}
