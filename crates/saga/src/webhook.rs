//! Webhook event processor.
//!
//! Provider deliveries are at-least-once. Every delivery is verified, then
//! applied under the transaction's row lock; a transaction that is already
//! terminal is acknowledged without being touched again.

use std::sync::Arc;

use checkout::{CheckoutSessionGateway, GatewayError, PaymentOutcome};
use common::PaymentTransactionId;
use transaction_store::{PaymentTransactionStatus, TransactionStore};

use crate::error::{PaymentError, Result};
use crate::events::PaymentTransactionCompleted;
use crate::services::CompletionEventPublisher;

/// What a delivery did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The transaction moved to a terminal status.
    Applied {
        payment_transaction_id: PaymentTransactionId,
        status: PaymentTransactionStatus,
    },
    /// The transaction was already terminal; nothing changed.
    Duplicate {
        payment_transaction_id: PaymentTransactionId,
        status: PaymentTransactionStatus,
    },
    /// The event type doesn't settle a payment.
    Ignored { event_type: String },
}

/// Applies provider webhook deliveries to payment transactions.
pub struct WebhookEventProcessor {
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<dyn CheckoutSessionGateway>,
    publisher: Arc<dyn CompletionEventPublisher>,
}

impl WebhookEventProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn CheckoutSessionGateway>,
        publisher: Arc<dyn CompletionEventPublisher>,
    ) -> Self {
        Self {
            transactions,
            gateway,
            publisher,
        }
    }

    #[tracing::instrument(skip(self, payload, signature), fields(payload_len = payload.len()))]
    pub async fn on_payment_provider_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome> {
        let event = self
            .gateway
            .verify_event(payload, signature)
            .inspect_err(|e| {
                if matches!(e, GatewayError::InvalidSignature(_)) {
                    metrics::counter!("webhook_signature_failures_total").increment(1);
                }
                tracing::warn!(error = %e, "webhook rejected");
            })?;

        metrics::counter!("webhook_events_received_total", "event_type" => event.event_type.clone())
            .increment(1);

        let Some(outcome) = event.kind.outcome() else {
            metrics::counter!("webhook_events_ignored_total").increment(1);
            tracing::info!(event_id = %event.id, event_type = %event.event_type, "webhook event ignored");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        };

        let target = match outcome {
            PaymentOutcome::Succeeded => PaymentTransactionStatus::Success,
            PaymentOutcome::Failed => PaymentTransactionStatus::Cancel,
        };

        let id = event
            .payment_transaction_id
            .ok_or_else(|| PaymentError::MissingTransactionId(event.id.clone()))?;

        let Some(lock) = self.transactions.lock_transaction(id).await? else {
            tracing::error!(
                event_id = %event.id,
                payment_transaction_id = %id,
                "webhook references unknown payment transaction"
            );
            return Err(PaymentError::TransactionNotFound(id));
        };

        let current = lock.transaction().status;
        if current.is_terminal() {
            lock.release().await?;
            metrics::counter!("webhook_events_duplicate_total").increment(1);
            tracing::warn!(
                event_id = %event.id,
                payment_transaction_id = %id,
                status = %current,
                "duplicate webhook delivery"
            );
            return Ok(WebhookOutcome::Duplicate {
                payment_transaction_id: id,
                status: current,
            });
        }

        let updated = lock.update_status(target).await?;

        metrics::counter!("payment_transactions_completed_total", "status" => updated.status.as_str())
            .increment(1);
        tracing::info!(
            event_id = %event.id,
            payment_transaction_id = %id,
            booking_id = %updated.booking_id,
            status = %updated.status,
            "payment transaction completed"
        );

        let completed =
            PaymentTransactionCompleted::new(updated.booking_id, updated.id, updated.status);
        if let Err(e) = self.publisher.publish_completed(&completed).await {
            metrics::counter!("completion_event_publish_failures_total").increment(1);
            tracing::error!(
                payment_transaction_id = %id,
                error = %e,
                "failed to publish payment transaction completed event"
            );
        }

        Ok(WebhookOutcome::Applied {
            payment_transaction_id: id,
            status: updated.status,
        })
    }
}
