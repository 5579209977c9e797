//! Clients for the services the payment saga talks to, with in-memory
//! implementations for development and tests.

pub mod booking;
pub mod catalog;
pub mod publisher;

pub use booking::{
    Booking, BookingServiceClient, BookingStatus, HttpBookingServiceClient, InMemoryBookingService,
};
pub use catalog::{
    CatalogServiceClient, HttpCatalogServiceClient, InMemoryCatalogService, Movie, Screen, Seat,
    Showtime, Theater,
};
pub use publisher::{CompletionEventPublisher, HttpEventPublisher, InMemoryEventPublisher};

use reqwest::Response;

use crate::error::ServiceClientError;

fn url_join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

async fn read_error(response: Response) -> ServiceClientError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ServiceClientError::UnexpectedStatus { status, message }
}
