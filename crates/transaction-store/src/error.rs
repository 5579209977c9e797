use thiserror::Error;

use crate::{BookingId, PaymentTransactionId, PaymentTransactionStatus};

/// Errors that can occur when interacting with the payment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The booking already has a transaction in `Pending`.
    #[error("Booking {0} already has a pending payment transaction")]
    PendingTransactionExists(BookingId),

    /// A checkout session was already recorded for the transaction.
    #[error("Checkout session already exists for payment transaction {0}")]
    CheckoutSessionExists(PaymentTransactionId),

    /// The transaction row disappeared while it was being updated.
    #[error("Payment transaction not found: {0}")]
    TransactionNotFound(PaymentTransactionId),

    /// The requested status change is not allowed by the state machine.
    #[error("Invalid status transition for payment transaction {id}: {from} -> {to}")]
    InvalidTransition {
        id: PaymentTransactionId,
        from: PaymentTransactionStatus,
        to: PaymentTransactionStatus,
    },

    /// A status column held a value outside the known codes.
    #[error("Unknown payment transaction status code: {0}")]
    UnknownStatus(i16),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
