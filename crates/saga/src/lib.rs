//! Payment transaction saga for movie ticket bookings.
//!
//! The saga runs without a distributed transaction:
//! 1. [`PaymentTransactionOrchestrator`] moves the booking to pending, records
//!    a `Pending` payment transaction and opens a hosted checkout page.
//! 2. The provider reports the outcome through at-least-once webhooks.
//! 3. [`WebhookEventProcessor`] applies the outcome under a row lock, exactly
//!    once, and notifies downstream services.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod services;
pub mod settings;
pub mod webhook;

pub use error::{ErrorKind, PaymentError, Result, ServiceClientError};
pub use events::{PaymentTransactionCompleted, PaymentTransactionCreated};
pub use orchestrator::PaymentTransactionOrchestrator;
pub use services::{
    Booking, BookingServiceClient, BookingStatus, CatalogServiceClient, CompletionEventPublisher,
    HttpBookingServiceClient, HttpCatalogServiceClient, HttpEventPublisher, InMemoryBookingService,
    InMemoryCatalogService, InMemoryEventPublisher, Movie, Screen, Seat, Showtime, Theater,
};
pub use settings::CheckoutSettings;
pub use webhook::{WebhookEventProcessor, WebhookOutcome};
