//! Persistence for payment transactions and their checkout sessions.
//!
//! Two implementations share the [`TransactionStore`] and
//! [`CheckoutSessionStore`] traits:
//! - [`InMemoryPaymentStore`] for tests and local development
//! - [`PostgresPaymentStore`] backed by sqlx
//!
//! Read-modify-write updates go through a [`TransactionLock`], which holds an
//! exclusive lock on a single transaction row until it is consumed or dropped.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod store;
pub mod transaction;

pub use common::{BookingId, PaymentTransactionId};
pub use error::{Result, StoreError};
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use session::CheckoutSession;
pub use store::{CheckoutSessionStore, TransactionLock, TransactionStore};
pub use transaction::{NewPaymentTransaction, PaymentTransaction, PaymentTransactionStatus};
