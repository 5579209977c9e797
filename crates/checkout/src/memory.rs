use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    CheckoutSessionGateway, CheckoutSessionRequest, CreatedCheckoutSession, GatewayError, Result,
    WebhookEvent, WebhookVerifier,
};

/// Secret used by the in-memory gateway unless one is supplied.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_in_memory";

/// In-memory checkout gateway for development and tests.
///
/// Sessions get sequential ids (`cs_test_0001`, ...) and a URL under
/// `https://checkout.test/session/`. Webhooks are verified with a real
/// [`WebhookVerifier`].
#[derive(Clone)]
pub struct InMemoryCheckoutGateway {
    sessions: Arc<RwLock<Vec<CheckoutSessionRequest>>>,
    expired: Arc<RwLock<HashSet<String>>>,
    next_id: Arc<AtomicU64>,
    fail_requests: Arc<AtomicBool>,
    verifier: WebhookVerifier,
}

impl Default for InMemoryCheckoutGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCheckoutGateway {
    pub fn new() -> Self {
        Self::with_verifier(WebhookVerifier::new(TEST_WEBHOOK_SECRET))
    }

    pub fn with_verifier(verifier: WebhookVerifier) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            expired: Arc::new(RwLock::new(HashSet::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            fail_requests: Arc::new(AtomicBool::new(false)),
            verifier,
        }
    }

    /// Makes subsequent provider calls fail (or succeed again).
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Requests that opened a session, in order.
    pub async fn created_sessions(&self) -> Vec<CheckoutSessionRequest> {
        self.sessions.read().await.clone()
    }

    pub async fn is_expired(&self, external_session_id: &str) -> bool {
        self.expired.read().await.contains(external_session_id)
    }

    /// Signs a payload the way the provider would.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        self.verifier
            .sign(payload, chrono::Utc::now().timestamp())
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(GatewayError::Provider {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CheckoutSessionGateway for InMemoryCheckoutGateway {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedCheckoutSession> {
        self.check_available()?;

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let external_session_id = format!("cs_test_{n:04}");
        let url = format!("https://checkout.test/session/{external_session_id}");

        self.sessions.write().await.push(request.clone());

        Ok(CreatedCheckoutSession {
            external_session_id,
            url,
        })
    }

    async fn cancel_session(&self, external_session_id: &str) -> Result<()> {
        self.check_available()?;
        self.expired
            .write()
            .await
            .insert(external_session_id.to_string());
        Ok(())
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.verifier.verify(payload, signature)?;
        WebhookEvent::parse(payload)
    }
}
