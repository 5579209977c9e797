//! Events the payment saga publishes to downstream services.

use chrono::{DateTime, Utc};
use common::{BookingId, PaymentTransactionId};
use serde::{Deserialize, Serialize};
use transaction_store::PaymentTransactionStatus;
use uuid::Uuid;

/// A checkout page was opened for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransactionCreated {
    pub event_id: Uuid,
    pub booking_id: BookingId,
    pub payment_transaction_id: PaymentTransactionId,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentTransactionCreated {
    pub fn new(booking_id: BookingId, payment_transaction_id: PaymentTransactionId) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            booking_id,
            payment_transaction_id,
            occurred_at: Utc::now(),
        }
    }
}

/// A payment transaction reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransactionCompleted {
    pub event_id: Uuid,
    pub booking_id: BookingId,
    pub payment_transaction_id: PaymentTransactionId,
    pub status: PaymentTransactionStatus,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentTransactionCompleted {
    pub fn new(
        booking_id: BookingId,
        payment_transaction_id: PaymentTransactionId,
        status: PaymentTransactionStatus,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            booking_id,
            payment_transaction_id,
            status,
            occurred_at: Utc::now(),
        }
    }
}
