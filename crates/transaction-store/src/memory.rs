use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    BookingId, CheckoutSession, NewPaymentTransaction, PaymentTransaction, PaymentTransactionId,
    PaymentTransactionStatus, Result, StoreError,
    store::{CheckoutSessionStore, TransactionLock, TransactionStore, validate_transition},
};

#[derive(Debug, Default)]
struct MemoryState {
    transactions: BTreeMap<PaymentTransactionId, PaymentTransaction>,
    sessions: HashMap<PaymentTransactionId, CheckoutSession>,
    last_id: i64,
}

/// In-memory payment store for tests and local development.
///
/// Row locks are emulated with one async mutex per transaction id, so a
/// [`TransactionLock`] from this store blocks other lockers of the same row
/// exactly like `SELECT ... FOR UPDATE` does in PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<MemoryState>>,
    row_locks: RowLocks,
}

type RowLocks = Arc<StdMutex<HashMap<PaymentTransactionId, Arc<Mutex<()>>>>>;

/// A held row mutex. The map entry is removed on drop once no other task
/// holds or waits for the same row.
struct RowGuard {
    locks: RowLocks,
    id: PaymentTransactionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

impl InMemoryPaymentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of transaction rows.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    /// Returns every transaction of a booking, oldest first.
    pub async fn transactions_for_booking(&self, booking_id: BookingId) -> Vec<PaymentTransaction> {
        self.state
            .read()
            .await
            .transactions
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect()
    }

    /// Returns the number of stored checkout sessions.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    fn row_lock(&self, id: PaymentTransactionId) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    async fn acquire(&self, id: PaymentTransactionId) -> Option<InMemoryTransactionLock> {
        let mutex = self.row_lock(id);
        let guard = RowGuard {
            locks: self.row_locks.clone(),
            id,
            guard: Some(mutex.lock_owned().await),
        };
        let current = self.state.read().await.transactions.get(&id).cloned();

        current.map(|transaction| InMemoryTransactionLock {
            state: self.state.clone(),
            transaction,
            _guard: guard,
        })
    }
}

#[async_trait]
impl TransactionStore for InMemoryPaymentStore {
    async fn create_transaction(&self, new: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let mut state = self.state.write().await;

        // Unique index simulation: one pending row per booking
        let has_pending = state.transactions.values().any(|t| {
            t.booking_id == new.booking_id && t.status == PaymentTransactionStatus::Pending
        });
        if has_pending {
            return Err(StoreError::PendingTransactionExists(new.booking_id));
        }

        state.last_id += 1;
        let transaction = PaymentTransaction {
            id: PaymentTransactionId::new(state.last_id),
            booking_id: new.booking_id,
            amount: new.amount,
            status: PaymentTransactionStatus::Pending,
            request_time: new.request_time,
            update_time: Utc::now(),
        };
        state
            .transactions
            .insert(transaction.id, transaction.clone());

        Ok(transaction)
    }

    async fn get_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn find_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .find(|t| t.booking_id == booking_id && t.status == PaymentTransactionStatus::Pending)
            .cloned())
    }

    async fn count_pending_for_booking(&self, booking_id: BookingId) -> Result<u64> {
        let state = self.state.read().await;
        let count = state
            .transactions
            .values()
            .filter(|t| t.booking_id == booking_id && t.status == PaymentTransactionStatus::Pending)
            .count();
        Ok(count as u64)
    }

    async fn lock_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<Option<Box<dyn TransactionLock>>> {
        Ok(self
            .acquire(id)
            .await
            .map(|lock| Box::new(lock) as Box<dyn TransactionLock>))
    }

    async fn lock_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Box<dyn TransactionLock>>> {
        let Some(pending) = self.find_pending_for_booking(booking_id).await? else {
            return Ok(None);
        };

        // The row may have been completed while we waited for the lock
        match self.acquire(pending.id).await {
            Some(lock) if lock.transaction.status == PaymentTransactionStatus::Pending => {
                Ok(Some(Box::new(lock)))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CheckoutSessionStore for InMemoryPaymentStore {
    async fn create_checkout_session(&self, session: CheckoutSession) -> Result<()> {
        let mut state = self.state.write().await;

        if state.sessions.contains_key(&session.payment_transaction_id) {
            return Err(StoreError::CheckoutSessionExists(
                session.payment_transaction_id,
            ));
        }

        state
            .sessions
            .insert(session.payment_transaction_id, session);
        Ok(())
    }

    async fn get_checkout_session(
        &self,
        payment_transaction_id: PaymentTransactionId,
    ) -> Result<Option<CheckoutSession>> {
        Ok(self
            .state
            .read()
            .await
            .sessions
            .get(&payment_transaction_id)
            .cloned())
    }
}

struct InMemoryTransactionLock {
    state: Arc<RwLock<MemoryState>>,
    transaction: PaymentTransaction,
    _guard: RowGuard,
}

#[async_trait]
impl TransactionLock for InMemoryTransactionLock {
    fn transaction(&self) -> &PaymentTransaction {
        &self.transaction
    }

    async fn update_status(
        self: Box<Self>,
        status: PaymentTransactionStatus,
    ) -> Result<PaymentTransaction> {
        validate_transition(&self.transaction, status)?;

        let mut state = self.state.write().await;
        let row = state
            .transactions
            .get_mut(&self.transaction.id)
            .ok_or(StoreError::TransactionNotFound(self.transaction.id))?;
        row.status = status;
        row.update_time = Utc::now();

        Ok(row.clone())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
