use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    BookingId, CheckoutSession, NewPaymentTransaction, PaymentTransaction, PaymentTransactionId,
    PaymentTransactionStatus, Result, StoreError,
    store::{CheckoutSessionStore, TransactionLock, TransactionStore, validate_transition},
};

/// Name of the partial unique index guarding one pending row per booking.
const ONE_PENDING_PER_BOOKING: &str = "payment_transaction_one_pending_per_booking";

/// Name of the primary key of `checkout_session`.
const CHECKOUT_SESSION_PKEY: &str = "checkout_session_pkey";

const TRANSACTION_COLUMNS: &str = "id, booking_id, amount, status, request_time, update_time";

/// PostgreSQL-backed payment store implementation.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("payment store migrations applied");
        Ok(())
    }

    fn row_to_transaction(row: PgRow) -> Result<PaymentTransaction> {
        let code: i16 = row.try_get("status")?;
        let status =
            PaymentTransactionStatus::from_code(code).ok_or(StoreError::UnknownStatus(code))?;

        Ok(PaymentTransaction {
            id: PaymentTransactionId::new(row.try_get("id")?),
            booking_id: BookingId::new(row.try_get("booking_id")?),
            amount: row.try_get("amount")?,
            status,
            request_time: row.try_get("request_time")?,
            update_time: row.try_get("update_time")?,
        })
    }

    fn row_to_session(row: PgRow) -> Result<CheckoutSession> {
        Ok(CheckoutSession {
            payment_transaction_id: PaymentTransactionId::new(
                row.try_get("payment_transaction_id")?,
            ),
            external_session_id: row.try_get("external_session_id")?,
            url: row.try_get("url")?,
        })
    }

    /// Starts a database transaction and locks the row selected by `query`.
    ///
    /// The returned guard owns the database transaction; the row lock lives
    /// until the guard commits or rolls back.
    async fn lock_with(
        &self,
        query: &str,
        key: i64,
    ) -> Result<Option<Box<dyn TransactionLock>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let transaction = Self::row_to_transaction(row)?;
                Ok(Some(Box::new(PostgresTransactionLock { tx, transaction })))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}

fn is_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl TransactionStore for PostgresPaymentStore {
    async fn create_transaction(&self, new: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_transaction (booking_id, amount, status, request_time, update_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(new.booking_id.as_i64())
        .bind(new.amount)
        .bind(PaymentTransactionStatus::Pending.code())
        .bind(new.request_time)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, ONE_PENDING_PER_BOOKING) {
                tracing::debug!(booking_id = %new.booking_id, "pending transaction already exists");
                return StoreError::PendingTransactionExists(new.booking_id);
            }
            StoreError::Database(e)
        })?;

        Self::row_to_transaction(row)
    }

    async fn get_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transaction WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn find_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM payment_transaction
            WHERE booking_id = $1 AND status = $2
            "#
        ))
        .bind(booking_id.as_i64())
        .bind(PaymentTransactionStatus::Pending.code())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn count_pending_for_booking(&self, booking_id: BookingId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transaction WHERE booking_id = $1 AND status = $2",
        )
        .bind(booking_id.as_i64())
        .bind(PaymentTransactionStatus::Pending.code())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn lock_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<Option<Box<dyn TransactionLock>>> {
        self.lock_with(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM payment_transaction WHERE id = $1 FOR UPDATE"),
            id.as_i64(),
        )
        .await
    }

    async fn lock_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Box<dyn TransactionLock>>> {
        // Status is a literal here so the re-check after a lock wait sees the
        // committed row and skips it if it is no longer pending.
        self.lock_with(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM payment_transaction \
                 WHERE booking_id = $1 AND status = 0 FOR UPDATE"
            ),
            booking_id.as_i64(),
        )
        .await
    }
}

#[async_trait]
impl CheckoutSessionStore for PostgresPaymentStore {
    async fn create_checkout_session(&self, session: CheckoutSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkout_session (payment_transaction_id, external_session_id, url)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(session.payment_transaction_id.as_i64())
        .bind(&session.external_session_id)
        .bind(&session.url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, CHECKOUT_SESSION_PKEY) {
                return StoreError::CheckoutSessionExists(session.payment_transaction_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_checkout_session(
        &self,
        payment_transaction_id: PaymentTransactionId,
    ) -> Result<Option<CheckoutSession>> {
        let row = sqlx::query(
            r#"
            SELECT payment_transaction_id, external_session_id, url
            FROM checkout_session
            WHERE payment_transaction_id = $1
            "#,
        )
        .bind(payment_transaction_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_session).transpose()
    }
}

struct PostgresTransactionLock {
    tx: Transaction<'static, Postgres>,
    transaction: PaymentTransaction,
}

#[async_trait]
impl TransactionLock for PostgresTransactionLock {
    fn transaction(&self) -> &PaymentTransaction {
        &self.transaction
    }

    async fn update_status(
        self: Box<Self>,
        status: PaymentTransactionStatus,
    ) -> Result<PaymentTransaction> {
        validate_transition(&self.transaction, status)?;

        let Self {
            mut tx,
            transaction,
        } = *self;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_transaction
            SET status = $1, update_time = $2
            WHERE id = $3
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(status.code())
        .bind(Utc::now())
        .bind(transaction.id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::TransactionNotFound(transaction.id))?;

        let updated = PostgresPaymentStore::row_to_transaction(row)?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
