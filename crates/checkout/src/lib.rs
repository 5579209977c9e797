//! Hosted checkout sessions for the payment service.
//!
//! This crate wraps the external payment provider:
//!
//! - [`CheckoutSessionGateway`]: open and expire hosted checkout pages and
//!   turn signed webhook deliveries into [`WebhookEvent`]s
//! - [`StripeCheckoutGateway`]: the Stripe Checkout implementation
//! - [`InMemoryCheckoutGateway`]: a local stand-in for development and tests
//! - [`WebhookVerifier`]: `t=...,v1=...` HMAC-SHA256 signature checks

pub mod error;
pub mod event;
pub mod gateway;
pub mod memory;
pub mod session;
pub mod signature;
pub mod stripe;

pub use error::{GatewayError, Result};
pub use event::{CheckoutEventKind, PaymentOutcome, WebhookEvent};
pub use gateway::CheckoutSessionGateway;
pub use memory::{InMemoryCheckoutGateway, TEST_WEBHOOK_SECRET};
pub use session::{CheckoutSessionRequest, CreatedCheckoutSession, LINE_ITEM_NAME, TicketLineItem};
pub use signature::{DEFAULT_TOLERANCE, SIGNATURE_HEADER, WebhookVerifier};
pub use stripe::{DEFAULT_API_BASE, StripeCheckoutGateway, StripeConfig};
