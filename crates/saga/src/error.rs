//! Payment saga error types.

use checkout::GatewayError;
use common::{BookingId, PaymentTransactionId};
use thiserror::Error;
use transaction_store::StoreError;

/// Caller-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unauthenticated,
    InvalidArgument,
    Internal,
}

/// Errors returned by calls to the booking, catalog and event services.
#[derive(Debug, Error)]
pub enum ServiceClientError {
    /// The remote entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The remote service refused the request because of the entity's state.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The remote service answered with a status this client doesn't expect.
    #[error("Unexpected response {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A test double was told to fail.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during payment transaction operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No booking in the required status is owned by the caller.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The booking already has a pending payment transaction.
    #[error("Booking {0} already has a pending payment transaction")]
    PendingTransactionExists(BookingId),

    /// Cancel was requested for a booking with nothing to cancel.
    #[error("Booking {0} has no pending payment transaction")]
    NoPendingTransaction(BookingId),

    #[error("Payment transaction not found: {0}")]
    TransactionNotFound(PaymentTransactionId),

    #[error("Checkout session not found for payment transaction {0}")]
    CheckoutSessionNotFound(PaymentTransactionId),

    #[error("Webhook event {0} carries no transaction id")]
    MissingTransactionId(String),

    #[error("Checkout gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceClientError),
}

impl PaymentError {
    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::BookingNotFound(_)
            | PaymentError::TransactionNotFound(_)
            | PaymentError::CheckoutSessionNotFound(_) => ErrorKind::NotFound,
            PaymentError::PendingTransactionExists(_) => ErrorKind::AlreadyExists,
            PaymentError::NoPendingTransaction(_) | PaymentError::MissingTransactionId(_) => {
                ErrorKind::InvalidArgument
            }
            PaymentError::Gateway(e) => match e {
                GatewayError::InvalidSignature(_) => ErrorKind::Unauthenticated,
                GatewayError::MalformedPayload(_) => ErrorKind::InvalidArgument,
                _ => ErrorKind::Internal,
            },
            PaymentError::Store(e) => match e {
                StoreError::PendingTransactionExists(_) => ErrorKind::AlreadyExists,
                StoreError::TransactionNotFound(_) => ErrorKind::NotFound,
                StoreError::InvalidTransition { .. } => ErrorKind::FailedPrecondition,
                _ => ErrorKind::Internal,
            },
            PaymentError::Service(e) => match e {
                ServiceClientError::NotFound { .. } => ErrorKind::NotFound,
                ServiceClientError::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
                _ => ErrorKind::Internal,
            },
        }
    }
}

/// Convenience type alias for payment saga results.
pub type Result<T> = std::result::Result<T, PaymentError>;
