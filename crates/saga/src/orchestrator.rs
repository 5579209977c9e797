//! Payment transaction orchestrator.
//!
//! Opens a checkout page for a booking and asks the provider to close it
//! again. Terminal transaction states are never written here; they arrive
//! through the webhook processor.

use std::sync::Arc;
use std::time::Instant;

use checkout::{CheckoutSessionGateway, CheckoutSessionRequest, TicketLineItem};
use chrono::Utc;
use common::{BookingId, PaymentTransactionId, UserId};
use transaction_store::{
    CheckoutSession, CheckoutSessionStore, NewPaymentTransaction, PaymentTransaction,
    TransactionStore,
};

use crate::error::{PaymentError, Result};
use crate::events::PaymentTransactionCreated;
use crate::services::{
    Booking, BookingServiceClient, BookingStatus, CatalogServiceClient, CompletionEventPublisher,
};
use crate::settings::CheckoutSettings;

/// Coordinates the booking service, the catalog, local storage and the
/// checkout provider for one payment attempt.
pub struct PaymentTransactionOrchestrator {
    bookings: Arc<dyn BookingServiceClient>,
    catalog: Arc<dyn CatalogServiceClient>,
    transactions: Arc<dyn TransactionStore>,
    sessions: Arc<dyn CheckoutSessionStore>,
    gateway: Arc<dyn CheckoutSessionGateway>,
    publisher: Arc<dyn CompletionEventPublisher>,
    settings: CheckoutSettings,
}

impl PaymentTransactionOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingServiceClient>,
        catalog: Arc<dyn CatalogServiceClient>,
        transactions: Arc<dyn TransactionStore>,
        sessions: Arc<dyn CheckoutSessionStore>,
        gateway: Arc<dyn CheckoutSessionGateway>,
        publisher: Arc<dyn CompletionEventPublisher>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            bookings,
            catalog,
            transactions,
            sessions,
            gateway,
            publisher,
            settings,
        }
    }

    /// Opens a checkout page for a booking and returns its URL.
    ///
    /// Repeating the call while the booking's transaction is still pending
    /// returns the same URL without creating anything.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_transaction(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<String> {
        let started = Instant::now();

        let (booking, pending) = tokio::try_join!(
            async {
                self.bookings
                    .get_booking_with_status(booking_id, user_id, BookingStatus::Initializing)
                    .await
                    .map_err(PaymentError::from)
            },
            async {
                self.transactions
                    .find_pending_for_booking(booking_id)
                    .await
                    .map_err(PaymentError::from)
            },
        )?;

        let Some(booking) = booking else {
            return match pending {
                Some(transaction) => self.replay(&transaction).await,
                None => Err(PaymentError::BookingNotFound(booking_id)),
            };
        };

        let line_item = self.resolve_line_item(&booking).await?;

        // The booking service lets exactly one caller through here.
        self.bookings
            .transition_initializing_to_pending(booking_id)
            .await?;

        if self.transactions.count_pending_for_booking(booking_id).await? > 0 {
            return Err(PaymentError::PendingTransactionExists(booking_id));
        }

        let request_time = Utc::now();
        let transaction = self
            .transactions
            .create_transaction(NewPaymentTransaction::new(
                booking_id,
                booking.amount,
                request_time,
            ))
            .await
            .map_err(|e| match e {
                transaction_store::StoreError::PendingTransactionExists(id) => {
                    PaymentError::PendingTransactionExists(id)
                }
                other => PaymentError::Store(other),
            })?;

        let request = CheckoutSessionRequest {
            payment_transaction_id: transaction.id,
            user_id,
            booking_id,
            amount: booking.amount,
            currency: self.settings.currency.clone(),
            line_item,
            expires_at: request_time + self.settings.checkout_timeout,
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            display_offset: self.settings.display_offset,
        };

        let created = match self.gateway.create_session(&request).await {
            Ok(created) => created,
            Err(e) => {
                record_orphan(transaction.id, &e);
                return Err(e.into());
            }
        };

        let session = CheckoutSession::new(
            transaction.id,
            created.external_session_id,
            created.url.clone(),
        );
        if let Err(e) = self.sessions.create_checkout_session(session).await {
            record_orphan(transaction.id, &e);
            return Err(e.into());
        }

        let event = PaymentTransactionCreated::new(booking_id, transaction.id);
        if let Err(e) = self.publisher.publish_created(&event).await {
            metrics::counter!("completion_event_publish_failures_total").increment(1);
            tracing::error!(
                payment_transaction_id = %transaction.id,
                error = %e,
                "failed to publish payment transaction created event"
            );
        }

        metrics::counter!("payment_transactions_created_total").increment(1);
        metrics::histogram!("payment_transaction_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            payment_transaction_id = %transaction.id,
            amount = booking.amount,
            "payment transaction created"
        );

        Ok(created.url)
    }

    /// Asks the provider to expire the booking's checkout page.
    ///
    /// The local transaction stays `Pending`; the provider's expiry webhook
    /// moves it to `Cancel`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment_transaction(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<()> {
        self.bookings
            .get_booking_with_status(booking_id, user_id, BookingStatus::Pending)
            .await?
            .ok_or(PaymentError::BookingNotFound(booking_id))?;

        let lock = self
            .transactions
            .lock_pending_for_booking(booking_id)
            .await?
            .ok_or(PaymentError::NoPendingTransaction(booking_id))?;
        let transaction_id = lock.transaction().id;

        let outcome = self.expire_session(transaction_id).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(
                payment_transaction_id = %transaction_id,
                error = %e,
                "failed to release transaction lock"
            );
        }
        outcome?;

        metrics::counter!("payment_transactions_cancel_requested_total").increment(1);
        tracing::info!(
            payment_transaction_id = %transaction_id,
            "checkout session expiry requested"
        );

        Ok(())
    }

    /// Loads a transaction and its checkout session.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> Result<(PaymentTransaction, Option<CheckoutSession>)> {
        let transaction = self
            .transactions
            .get_transaction(id)
            .await?
            .ok_or(PaymentError::TransactionNotFound(id))?;
        let session = self.sessions.get_checkout_session(id).await?;

        Ok((transaction, session))
    }

    async fn replay(&self, transaction: &PaymentTransaction) -> Result<String> {
        let session = self
            .sessions
            .get_checkout_session(transaction.id)
            .await?
            .ok_or(PaymentError::CheckoutSessionNotFound(transaction.id))?;

        metrics::counter!("payment_transactions_idempotent_replays_total").increment(1);
        tracing::info!(
            payment_transaction_id = %transaction.id,
            "returning existing checkout session"
        );

        Ok(session.url)
    }

    async fn resolve_line_item(&self, booking: &Booking) -> Result<TicketLineItem> {
        let showtime = self.catalog.get_showtime(booking.showtime_id).await?;
        let movie = self.catalog.get_movie(showtime.movie_id).await?;
        let seat = self.catalog.get_seat(booking.seat_id).await?;
        let screen = self.catalog.get_screen(seat.screen_id).await?;
        let theater = self.catalog.get_theater(screen.theater_id).await?;

        Ok(TicketLineItem {
            movie_title: movie.title,
            seat_no: seat.no,
            showtime_start: showtime.time_start,
            theater_name: theater.name,
            screen_name: screen.name,
        })
    }

    async fn expire_session(&self, transaction_id: PaymentTransactionId) -> Result<()> {
        let session = self
            .sessions
            .get_checkout_session(transaction_id)
            .await?
            .ok_or(PaymentError::CheckoutSessionNotFound(transaction_id))?;

        self.gateway
            .cancel_session(&session.external_session_id)
            .await?;
        Ok(())
    }
}

fn record_orphan(id: PaymentTransactionId, error: &dyn std::error::Error) {
    metrics::counter!("payment_transaction_orphaned_total").increment(1);
    tracing::error!(
        payment_transaction_id = %id,
        error = %error,
        "pending payment transaction left without a checkout session"
    );
}
