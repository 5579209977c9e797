use async_trait::async_trait;

use crate::{
    BookingId, CheckoutSession, NewPaymentTransaction, PaymentTransaction, PaymentTransactionId,
    PaymentTransactionStatus, Result, StoreError,
};

/// Storage for payment transaction rows.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new `Pending` transaction and returns it with its assigned id.
    ///
    /// Fails with `PendingTransactionExists` if the booking already has a
    /// pending transaction. This check is atomic with the insert.
    async fn create_transaction(&self, new: NewPaymentTransaction) -> Result<PaymentTransaction>;

    /// Fetches a transaction by id without locking it.
    async fn get_transaction(&self, id: PaymentTransactionId)
    -> Result<Option<PaymentTransaction>>;

    /// Fetches the pending transaction of a booking, if any.
    async fn find_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentTransaction>>;

    /// Counts the pending transactions of a booking.
    async fn count_pending_for_booking(&self, booking_id: BookingId) -> Result<u64>;

    /// Locks a transaction row exclusively.
    ///
    /// Waits for any other holder of the same row to finish. Returns None if
    /// the row doesn't exist.
    async fn lock_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<Option<Box<dyn TransactionLock>>>;

    /// Locks the pending transaction of a booking exclusively.
    ///
    /// Returns None if the booking has no pending transaction once the lock
    /// is acquired.
    async fn lock_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Box<dyn TransactionLock>>>;
}

/// An exclusive lock on one transaction row.
///
/// The lock is released when the guard is consumed by [`update_status`] or
/// [`release`], or when it is dropped.
///
/// [`update_status`]: TransactionLock::update_status
/// [`release`]: TransactionLock::release
#[async_trait]
pub trait TransactionLock: Send {
    /// The row as read under the lock.
    fn transaction(&self) -> &PaymentTransaction;

    /// Persists a new status, stamps the update time and releases the lock.
    ///
    /// Fails with `InvalidTransition` if the state machine forbids the change.
    async fn update_status(
        self: Box<Self>,
        status: PaymentTransactionStatus,
    ) -> Result<PaymentTransaction>;

    /// Releases the lock without writing anything.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Storage for checkout sessions, keyed by payment transaction id.
#[async_trait]
pub trait CheckoutSessionStore: Send + Sync {
    /// Records the session. Fails with `CheckoutSessionExists` on a second write.
    async fn create_checkout_session(&self, session: CheckoutSession) -> Result<()>;

    /// Fetches the session of a payment transaction.
    async fn get_checkout_session(
        &self,
        payment_transaction_id: PaymentTransactionId,
    ) -> Result<Option<CheckoutSession>>;
}

/// Validates a status change requested through a lock.
pub(crate) fn validate_transition(
    current: &PaymentTransaction,
    target: PaymentTransactionStatus,
) -> Result<()> {
    if current.status.can_transition_to(target) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: current.id,
            from: current.status,
            to: target,
        })
    }
}
