//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod payment_transactions;
pub mod webhook;
