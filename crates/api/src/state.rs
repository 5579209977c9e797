//! Shared application state and dependency wiring.

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutSessionGateway, GatewayError, InMemoryCheckoutGateway, StripeCheckoutGateway,
    StripeConfig, TEST_WEBHOOK_SECRET, WebhookVerifier,
};
use saga::{
    BookingServiceClient, CatalogServiceClient, CompletionEventPublisher,
    HttpBookingServiceClient, HttpCatalogServiceClient, HttpEventPublisher,
    InMemoryBookingService, InMemoryCatalogService, InMemoryEventPublisher,
    PaymentTransactionOrchestrator, WebhookEventProcessor,
};
use sqlx::PgPool;
use transaction_store::{
    CheckoutSessionStore, InMemoryPaymentStore, PostgresPaymentStore, TransactionStore,
};

use crate::config::Config;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: PaymentTransactionOrchestrator,
    pub webhooks: WebhookEventProcessor,
    /// Which storage backend serves this process, reported by `/health`.
    pub storage: &'static str,
}

/// The collaborators the saga runs against.
#[derive(Clone)]
pub struct Dependencies {
    pub transactions: Arc<dyn TransactionStore>,
    pub sessions: Arc<dyn CheckoutSessionStore>,
    pub gateway: Arc<dyn CheckoutSessionGateway>,
    pub bookings: Arc<dyn BookingServiceClient>,
    pub catalog: Arc<dyn CatalogServiceClient>,
    pub publisher: Arc<dyn CompletionEventPublisher>,
    pub storage: &'static str,
}

impl Dependencies {
    /// Wires every collaborator in memory.
    pub fn in_memory() -> Self {
        let store = InMemoryPaymentStore::new();
        Self {
            transactions: Arc::new(store.clone()),
            sessions: Arc::new(store),
            gateway: Arc::new(InMemoryCheckoutGateway::new()),
            bookings: Arc::new(InMemoryBookingService::new()),
            catalog: Arc::new(InMemoryCatalogService::new()),
            publisher: Arc::new(InMemoryEventPublisher::new()),
            storage: "memory",
        }
    }

    /// Wires collaborators from configuration. Anything left unconfigured
    /// runs in memory.
    pub fn from_config(config: &Config, pool: Option<PgPool>) -> Result<Self, GatewayError> {
        let mut deps = Self::in_memory();

        if let Some(pool) = pool {
            let store = PostgresPaymentStore::new(pool);
            deps.transactions = Arc::new(store.clone());
            deps.sessions = Arc::new(store);
            deps.storage = "postgres";
        }

        let gateway: Arc<dyn CheckoutSessionGateway> = match &config.stripe_api_key {
            Some(api_key) => {
                let webhook_secret = config.stripe_webhook_secret.clone().ok_or_else(|| {
                    GatewayError::Configuration(
                        "STRIPE_WEBHOOK_ENDPOINT_SECRET must be set when STRIPE_API_KEY is set"
                            .to_string(),
                    )
                })?;
                Arc::new(StripeCheckoutGateway::new(StripeConfig {
                    api_key: api_key.clone(),
                    api_base: config.stripe_api_base.clone(),
                    webhook_secret,
                    webhook_tolerance: config.webhook_tolerance(),
                    request_timeout: OUTBOUND_TIMEOUT,
                })?)
            }
            None => {
                tracing::warn!("STRIPE_API_KEY not set, using in-memory checkout gateway");
                let webhook_secret = config
                    .stripe_webhook_secret
                    .clone()
                    .unwrap_or_else(|| TEST_WEBHOOK_SECRET.to_string());
                Arc::new(InMemoryCheckoutGateway::with_verifier(
                    WebhookVerifier::new(webhook_secret).with_tolerance(config.webhook_tolerance()),
                ))
            }
        };
        deps.gateway = gateway;

        let client = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()?;

        if let Some(url) = &config.booking_service_url {
            deps.bookings = Arc::new(HttpBookingServiceClient::new(client.clone(), url.clone()));
        }
        if let Some(url) = &config.catalog_service_url {
            deps.catalog = Arc::new(HttpCatalogServiceClient::new(client.clone(), url.clone()));
        }
        if let Some(url) = &config.payment_events_url {
            deps.publisher = Arc::new(HttpEventPublisher::new(client, url.clone()));
        }

        Ok(deps)
    }
}

impl AppState {
    pub fn new(deps: Dependencies, config: &Config) -> Arc<Self> {
        let orchestrator = PaymentTransactionOrchestrator::new(
            deps.bookings,
            deps.catalog,
            deps.transactions.clone(),
            deps.sessions,
            deps.gateway.clone(),
            deps.publisher.clone(),
            config.checkout_settings(),
        );
        let webhooks = WebhookEventProcessor::new(deps.transactions, deps.gateway, deps.publisher);

        Arc::new(Self {
            orchestrator,
            webhooks,
            storage: deps.storage,
        })
    }
}
