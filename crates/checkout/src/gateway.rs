use async_trait::async_trait;

use crate::{CheckoutSessionRequest, CreatedCheckoutSession, Result, WebhookEvent};

/// The external payment provider hosting checkout pages.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CheckoutSessionGateway: Send + Sync {
    /// Opens a hosted checkout page for one payment transaction.
    ///
    /// The transaction id travels as session metadata and comes back on
    /// every webhook delivery for the session.
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedCheckoutSession>;

    /// Asks the provider to expire a session. The provider answers later
    /// with an expiry webhook.
    async fn cancel_session(&self, external_session_id: &str) -> Result<()>;

    /// Verifies a webhook signature and parses the delivery.
    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent>;
}
