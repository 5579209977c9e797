//! Integration tests for the payment transaction saga.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkout::{
    CheckoutSessionGateway, CheckoutSessionRequest, CreatedCheckoutSession, GatewayError,
    InMemoryCheckoutGateway, WebhookEvent,
};
use chrono::{TimeZone, Utc};
use common::{
    BookingId, MovieId, PaymentTransactionId, ScreenId, SeatId, ShowtimeId, TheaterId, UserId,
};
use saga::{
    Booking, BookingServiceClient, BookingStatus, CheckoutSettings, ErrorKind,
    InMemoryBookingService, InMemoryCatalogService, InMemoryEventPublisher, Movie,
    PaymentTransactionOrchestrator, Screen, Seat, ServiceClientError, Showtime, Theater,
    WebhookEventProcessor, WebhookOutcome,
};
use serde_json::json;
use transaction_store::{
    InMemoryPaymentStore, NewPaymentTransaction, PaymentTransaction, PaymentTransactionStatus,
    TransactionLock, TransactionStore,
};

const BOOKING: i64 = 42;
const USER: i64 = 7;
const AMOUNT: i64 = 100_000;

struct TestHarness {
    orchestrator: Arc<PaymentTransactionOrchestrator>,
    processor: WebhookEventProcessor,
    store: InMemoryPaymentStore,
    gateway: InMemoryCheckoutGateway,
    bookings: InMemoryBookingService,
    catalog: InMemoryCatalogService,
    publisher: InMemoryEventPublisher,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let gateway = InMemoryCheckoutGateway::new();
        let bookings = InMemoryBookingService::new();
        let catalog = InMemoryCatalogService::new();
        let publisher = InMemoryEventPublisher::new();

        let orchestrator = PaymentTransactionOrchestrator::new(
            Arc::new(bookings.clone()),
            Arc::new(catalog.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(publisher.clone()),
            CheckoutSettings::default(),
        );
        let processor = WebhookEventProcessor::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(publisher.clone()),
        );

        let harness = Self {
            orchestrator: Arc::new(orchestrator),
            processor,
            store,
            gateway,
            bookings,
            catalog,
            publisher,
        };
        harness.seed_catalog();
        harness
    }

    fn seed_catalog(&self) {
        self.catalog.add_showtime(Showtime {
            id: ShowtimeId::new(1),
            movie_id: MovieId::new(1),
            screen_id: ScreenId::new(1),
            time_start: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap(),
        });
        self.catalog.add_movie(Movie {
            id: MovieId::new(1),
            title: "Spirited Away".to_string(),
        });
        self.catalog.add_seat(Seat {
            id: SeatId::new(1),
            screen_id: ScreenId::new(1),
            no: "E5".to_string(),
        });
        self.catalog.add_screen(Screen {
            id: ScreenId::new(1),
            theater_id: TheaterId::new(1),
            name: "Screen 4".to_string(),
        });
        self.catalog.add_theater(Theater {
            id: TheaterId::new(1),
            name: "Lakeside Cinema".to_string(),
        });
    }

    fn add_booking(&self, id: i64, status: BookingStatus) {
        self.bookings.insert(Booking {
            id: BookingId::new(id),
            user_id: UserId::new(USER),
            showtime_id: ShowtimeId::new(1),
            seat_id: SeatId::new(1),
            amount: AMOUNT,
            status,
        });
    }

    async fn create(&self, booking: i64) -> saga::Result<String> {
        self.orchestrator
            .create_payment_transaction(BookingId::new(booking), UserId::new(USER))
            .await
    }

    async fn pending_transaction_id(&self, booking: i64) -> PaymentTransactionId {
        self.store
            .find_pending_for_booking(BookingId::new(booking))
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn deliver(
        &self,
        event_type: &str,
        payment_status: &str,
        transaction_id: PaymentTransactionId,
    ) -> saga::Result<WebhookOutcome> {
        let payload = serde_json::to_vec(&json!({
            "id": format!("evt_{event_type}_{transaction_id}"),
            "type": event_type,
            "data": {
                "object": {
                    "id": "cs_test_0001",
                    "payment_status": payment_status,
                    "metadata": {
                        "transaction_id": transaction_id.to_string(),
                        "user_id": USER.to_string(),
                        "booking_id": BOOKING.to_string()
                    }
                }
            }
        }))
        .unwrap();
        let signature = self.gateway.sign(&payload).unwrap();

        self.processor
            .on_payment_provider_event(&payload, &signature)
            .await
    }
}

#[tokio::test]
async fn test_create_payment_transaction() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);

    let url = h.create(BOOKING).await.unwrap();
    assert!(!url.is_empty());
    assert_eq!(url, "https://checkout.test/session/cs_test_0001");

    // Booking moved to pending through the booking service
    assert_eq!(
        h.bookings.status(BookingId::new(BOOKING)),
        Some(BookingStatus::Pending)
    );

    let transactions = h.store.transactions_for_booking(BookingId::new(BOOKING)).await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, PaymentTransactionStatus::Pending);
    assert_eq!(transactions[0].amount, AMOUNT);

    let (_, session) = h
        .orchestrator
        .get_payment_transaction(transactions[0].id)
        .await
        .unwrap();
    let session = session.unwrap();
    assert_eq!(session.external_session_id, "cs_test_0001");
    assert_eq!(session.url, url);

    // The checkout page describes the ticket and echoes the transaction id
    let requests = h.gateway.created_sessions().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.payment_transaction_id, transactions[0].id);
    assert_eq!(request.amount, AMOUNT);
    assert_eq!(request.currency, "vnd");
    assert_eq!(
        request.description(),
        "Movie: Spirited Away | Seat: E5 | Date: Saturday, 01/06/2024 19:00:00 \
         | Theater: Lakeside Cinema | Screen: Screen 4"
    );
    assert_eq!(
        request.expires_at - transactions[0].request_time,
        chrono::TimeDelta::minutes(30)
    );

    let created = h.publisher.created_events();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].booking_id, BookingId::new(BOOKING));
}

#[tokio::test]
async fn test_repeated_create_returns_same_url() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);

    let first = h.create(BOOKING).await.unwrap();
    let second = h.create(BOOKING).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.transaction_count().await, 1);
    assert_eq!(h.gateway.created_sessions().await.len(), 1);
    assert_eq!(h.bookings.transition_count(), 1);
}

#[tokio::test]
async fn test_create_unknown_booking_is_not_found() {
    let h = TestHarness::new();

    let err = h.create(BOOKING).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_create_for_another_users_booking_is_not_found() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);

    let err = h
        .orchestrator
        .create_payment_transaction(BookingId::new(BOOKING), UserId::new(USER + 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        h.bookings.status(BookingId::new(BOOKING)),
        Some(BookingStatus::Initializing)
    );
}

#[tokio::test]
async fn test_missing_catalog_entry_is_not_found() {
    let h = TestHarness::new();
    h.bookings.insert(Booking {
        id: BookingId::new(BOOKING),
        user_id: UserId::new(USER),
        showtime_id: ShowtimeId::new(99),
        seat_id: SeatId::new(1),
        amount: AMOUNT,
        status: BookingStatus::Initializing,
    });

    let err = h.create(BOOKING).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Nothing was reserved
    assert_eq!(
        h.bookings.status(BookingId::new(BOOKING)),
        Some(BookingStatus::Initializing)
    );
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_creates_open_one_transaction() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .create_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
                .await
        }));
    }

    let mut urls = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(url) => urls.push(url),
            Err(e) => assert!(
                matches!(
                    e.kind(),
                    ErrorKind::FailedPrecondition
                        | ErrorKind::AlreadyExists
                        | ErrorKind::NotFound
                ),
                "unexpected error: {e}"
            ),
        }
    }

    assert!(!urls.is_empty());
    assert!(urls.iter().all(|u| u == &urls[0]));
    assert_eq!(
        h.store
            .count_pending_for_booking(BookingId::new(BOOKING))
            .await
            .unwrap(),
        1
    );
    assert_eq!(h.gateway.created_sessions().await.len(), 1);
}

/// Booking service that always reports the booking as initializing but
/// refuses the transition, as if a concurrent request had just won it.
struct LostRaceBookingService;

#[async_trait]
impl BookingServiceClient for LostRaceBookingService {
    async fn get_booking_with_status(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        status: BookingStatus,
    ) -> Result<Option<Booking>, ServiceClientError> {
        Ok(Some(Booking {
            id: booking_id,
            user_id,
            showtime_id: ShowtimeId::new(1),
            seat_id: SeatId::new(1),
            amount: AMOUNT,
            status,
        }))
    }

    async fn transition_initializing_to_pending(
        &self,
        booking_id: BookingId,
    ) -> Result<(), ServiceClientError> {
        Err(ServiceClientError::FailedPrecondition(format!(
            "booking {booking_id} is pending"
        )))
    }
}

#[tokio::test]
async fn test_lost_transition_race_is_failed_precondition() {
    let h = TestHarness::new();
    let orchestrator = PaymentTransactionOrchestrator::new(
        Arc::new(LostRaceBookingService),
        Arc::new(h.catalog.clone()),
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        Arc::new(h.gateway.clone()),
        Arc::new(h.publisher.clone()),
        CheckoutSettings::default(),
    );

    let err = orchestrator
        .create_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(h.store.transaction_count().await, 0);
    assert!(h.gateway.created_sessions().await.is_empty());
}

/// Store whose pending count always reads zero, so the insert itself has to
/// enforce one pending transaction per booking.
struct StaleCountStore(InMemoryPaymentStore);

#[async_trait]
impl TransactionStore for StaleCountStore {
    async fn create_transaction(
        &self,
        new: NewPaymentTransaction,
    ) -> transaction_store::Result<PaymentTransaction> {
        self.0.create_transaction(new).await
    }

    async fn get_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> transaction_store::Result<Option<PaymentTransaction>> {
        self.0.get_transaction(id).await
    }

    async fn find_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> transaction_store::Result<Option<PaymentTransaction>> {
        self.0.find_pending_for_booking(booking_id).await
    }

    async fn count_pending_for_booking(
        &self,
        _booking_id: BookingId,
    ) -> transaction_store::Result<u64> {
        Ok(0)
    }

    async fn lock_transaction(
        &self,
        id: PaymentTransactionId,
    ) -> transaction_store::Result<Option<Box<dyn TransactionLock>>> {
        self.0.lock_transaction(id).await
    }

    async fn lock_pending_for_booking(
        &self,
        booking_id: BookingId,
    ) -> transaction_store::Result<Option<Box<dyn TransactionLock>>> {
        self.0.lock_pending_for_booking(booking_id).await
    }
}

#[tokio::test]
async fn test_unique_pending_constraint_is_already_exists() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.store
        .create_transaction(NewPaymentTransaction::new(
            BookingId::new(BOOKING),
            AMOUNT,
            Utc::now(),
        ))
        .await
        .unwrap();

    let orchestrator = PaymentTransactionOrchestrator::new(
        Arc::new(h.bookings.clone()),
        Arc::new(h.catalog.clone()),
        Arc::new(StaleCountStore(h.store.clone())),
        Arc::new(h.store.clone()),
        Arc::new(h.gateway.clone()),
        Arc::new(h.publisher.clone()),
        CheckoutSettings::default(),
    );

    let err = orchestrator
        .create_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        saga::PaymentError::PendingTransactionExists(id) if id == BookingId::new(BOOKING)
    ));
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.store.transaction_count().await, 1);
    assert!(h.gateway.created_sessions().await.is_empty());
}

#[tokio::test]
async fn test_confirmed_booking_is_not_payable() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Confirmed);

    let err = h.create(BOOKING).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_provider_failure_leaves_orphaned_pending_transaction() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.gateway.set_fail_requests(true);

    let err = h.create(BOOKING).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    // The pending row stays, without a checkout session
    let id = h.pending_transaction_id(BOOKING).await;
    let (_, session) = h.orchestrator.get_payment_transaction(id).await.unwrap();
    assert!(session.is_none());
    assert!(h.publisher.created_events().is_empty());

    // A retry finds the booking pending and no session to return
    h.gateway.set_fail_requests(false);
    let err = h.create(BOOKING).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.store.transaction_count().await, 1);
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_create() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.publisher.set_fail_requests(true);

    let url = h.create(BOOKING).await.unwrap();
    assert!(!url.is_empty());
    assert_eq!(h.store.session_count().await, 1);
}

#[tokio::test]
async fn test_completed_webhook_marks_success() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let outcome = h
        .deliver("checkout.session.completed", "paid", id)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            payment_transaction_id: id,
            status: PaymentTransactionStatus::Success
        }
    );

    let transaction = h.store.get_transaction(id).await.unwrap().unwrap();
    assert_eq!(transaction.status, PaymentTransactionStatus::Success);

    let completed = h.publisher.completed_events();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].booking_id, BookingId::new(BOOKING));
    assert_eq!(completed[0].status, PaymentTransactionStatus::Success);
}

#[tokio::test]
async fn test_duplicate_webhook_is_acknowledged_once() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    h.deliver("checkout.session.completed", "paid", id)
        .await
        .unwrap();
    let before = h.store.get_transaction(id).await.unwrap().unwrap();

    let second = h
        .deliver("checkout.session.completed", "paid", id)
        .await
        .unwrap();
    assert_eq!(
        second,
        WebhookOutcome::Duplicate {
            payment_transaction_id: id,
            status: PaymentTransactionStatus::Success
        }
    );

    let after = h.store.get_transaction(id).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(h.publisher.completed_events().len(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicate_webhooks_apply_once() {
    let h = Arc::new(TestHarness::new());
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.deliver("checkout.session.completed", "paid", id)
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), WebhookOutcome::Applied { .. }) {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.publisher.completed_events().len(), 1);
}

#[tokio::test]
async fn test_terminal_status_never_changes() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    h.deliver("checkout.session.expired", "unpaid", id)
        .await
        .unwrap();

    let late = h
        .deliver("checkout.session.completed", "paid", id)
        .await
        .unwrap();
    assert!(matches!(late, WebhookOutcome::Duplicate { .. }));

    let transaction = h.store.get_transaction(id).await.unwrap().unwrap();
    assert_eq!(transaction.status, PaymentTransactionStatus::Cancel);
    assert_eq!(h.publisher.completed_events().len(), 1);
}

#[tokio::test]
async fn test_unpaid_completion_waits_for_async_payment() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let outcome = h
        .deliver("checkout.session.completed", "unpaid", id)
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Pending
    );

    h.deliver("checkout.session.async_payment_failed", "unpaid", id)
        .await
        .unwrap();
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Cancel
    );
}

#[tokio::test]
async fn test_completion_without_payment_status_marks_success() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let payload = serde_json::to_vec(&json!({
        "id": "evt_completed_no_status",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_0001",
                "metadata": { "transaction_id": id.to_string() }
            }
        }
    }))
    .unwrap();
    let signature = h.gateway.sign(&payload).unwrap();

    let outcome = h
        .processor
        .on_payment_provider_event(&payload, &signature)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            payment_transaction_id: id,
            status: PaymentTransactionStatus::Success,
        }
    );
    assert_eq!(h.publisher.completed_events().len(), 1);
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();

    let err = h
        .deliver(
            "checkout.session.completed",
            "paid",
            PaymentTransactionId::new(9_999),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let id = h.pending_transaction_id(BOOKING).await;
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Pending
    );
    assert!(h.publisher.completed_events().is_empty());
}

#[tokio::test]
async fn test_invalid_signature_is_rejected() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let payload = serde_json::to_vec(&json!({
        "id": "evt_forged",
        "type": "checkout.session.completed",
        "data": {"object": {"payment_status": "paid", "metadata": {"transaction_id": id.to_string()}}}
    }))
    .unwrap();
    let signature = format!("t={},v1={}", Utc::now().timestamp(), "00".repeat(32));

    let err = h
        .processor
        .on_payment_provider_event(&payload, &signature)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_malformed_payload_is_invalid_argument() {
    let h = TestHarness::new();
    let payload = b"{\"id\": 12";
    let signature = h.gateway.sign(payload).unwrap();

    let err = h
        .processor
        .on_payment_provider_event(payload, &signature)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_unrelated_event_is_ignored() {
    let h = TestHarness::new();
    let payload = serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": "payment_intent.created",
        "data": {"object": {"id": "pi_1"}}
    }))
    .unwrap();
    let signature = h.gateway.sign(&payload).unwrap();

    let outcome = h
        .processor
        .on_payment_provider_event(&payload, &signature)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "payment_intent.created".to_string()
        }
    );
}

#[tokio::test]
async fn test_cancel_expires_session_and_waits_for_webhook() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    h.orchestrator
        .cancel_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
        .await
        .unwrap();

    assert!(h.gateway.is_expired("cs_test_0001").await);
    // Local state only changes when the provider reports the expiry
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Pending
    );
    assert!(h.publisher.completed_events().is_empty());

    h.deliver("checkout.session.expired", "unpaid", id)
        .await
        .unwrap();
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Cancel
    );

    let completed = h.publisher.completed_events();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, PaymentTransactionStatus::Cancel);
}

/// Gateway that takes a while to expire a session, keeping the cancel's row
/// lock held long enough for a webhook to arrive.
struct SlowExpiryGateway(InMemoryCheckoutGateway);

#[async_trait]
impl CheckoutSessionGateway for SlowExpiryGateway {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> checkout::Result<CreatedCheckoutSession> {
        self.0.create_session(request).await
    }

    async fn cancel_session(&self, external_session_id: &str) -> checkout::Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.cancel_session(external_session_id).await
    }

    fn verify_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError> {
        self.0.verify_event(payload, signature)
    }
}

#[tokio::test]
async fn test_expiry_webhook_waits_for_cancel_lock() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let orchestrator = Arc::new(PaymentTransactionOrchestrator::new(
        Arc::new(h.bookings.clone()),
        Arc::new(h.catalog.clone()),
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        Arc::new(SlowExpiryGateway(h.gateway.clone())),
        Arc::new(h.publisher.clone()),
        CheckoutSettings::default(),
    ));

    let cancel = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .cancel_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
                .await
        })
    };
    // Let the cancel take the row lock before the webhook arrives
    tokio::time::sleep(Duration::from_millis(20)).await;

    let outcome = h
        .deliver("checkout.session.expired", "unpaid", id)
        .await
        .unwrap();
    cancel.await.unwrap().unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            payment_transaction_id: id,
            status: PaymentTransactionStatus::Cancel,
        }
    );
    assert!(h.gateway.is_expired("cs_test_0001").await);
    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Cancel
    );
    assert_eq!(h.publisher.completed_events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_and_expiry_settle_once() {
    let h = Arc::new(TestHarness::new());
    h.add_booking(BOOKING, BookingStatus::Initializing);
    h.create(BOOKING).await.unwrap();
    let id = h.pending_transaction_id(BOOKING).await;

    let cancel = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .cancel_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
                .await
        })
    };
    let webhook = {
        let h = h.clone();
        tokio::spawn(async move { h.deliver("checkout.session.expired", "unpaid", id).await })
    };

    // Whichever runs second either finds no pending row or a terminal one
    match cancel.await.unwrap() {
        Ok(()) => {}
        Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidArgument),
    }
    let outcome = webhook.await.unwrap().unwrap();
    assert!(matches!(outcome, WebhookOutcome::Applied { .. }));

    assert_eq!(
        h.store.get_transaction(id).await.unwrap().unwrap().status,
        PaymentTransactionStatus::Cancel
    );
    let completed = h.publisher.completed_events();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, PaymentTransactionStatus::Cancel);
}

#[tokio::test]
async fn test_cancel_requires_pending_booking() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);

    let err = h
        .orchestrator
        .cancel_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_cancel_without_pending_transaction_is_invalid_argument() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Pending);

    let err = h
        .orchestrator
        .cancel_payment_transaction(BookingId::new(BOOKING), UserId::new(USER))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_retry_after_cancel_opens_new_transaction() {
    let h = TestHarness::new();
    h.add_booking(BOOKING, BookingStatus::Initializing);
    let first_url = h.create(BOOKING).await.unwrap();
    let first_id = h.pending_transaction_id(BOOKING).await;

    h.deliver("checkout.session.expired", "unpaid", first_id)
        .await
        .unwrap();

    // The booking service puts the booking back for another attempt
    h.bookings
        .set_status(BookingId::new(BOOKING), BookingStatus::Initializing);

    let second_url = h.create(BOOKING).await.unwrap();
    assert_ne!(first_url, second_url);

    let history = h.store.transactions_for_booking(BookingId::new(BOOKING)).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, PaymentTransactionStatus::Cancel);
    assert_eq!(history[1].status, PaymentTransactionStatus::Pending);
}
