//! Booking service client and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{BookingId, SeatId, ShowtimeId, UserId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{read_error, url_join};
use crate::error::ServiceClientError;

/// Lifecycle of a booking, owned by the booking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Initializing,
    Pending,
    Confirmed,
    Cancel,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Initializing => "initializing",
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of a booking the payment saga reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub showtime_id: ShowtimeId,
    pub seat_id: SeatId,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub status: BookingStatus,
}

/// Narrow client for the booking service.
#[async_trait]
pub trait BookingServiceClient: Send + Sync {
    /// Fetches a booking owned by `user_id` only if it is in `status`.
    async fn get_booking_with_status(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        status: BookingStatus,
    ) -> Result<Option<Booking>, ServiceClientError>;

    /// Moves a booking from `Initializing` to `Pending`.
    ///
    /// Exactly one concurrent caller wins; the others get
    /// `FailedPrecondition`.
    async fn transition_initializing_to_pending(
        &self,
        booking_id: BookingId,
    ) -> Result<(), ServiceClientError>;
}

#[derive(Debug, Default)]
struct InMemoryBookingState {
    bookings: HashMap<BookingId, Booking>,
    transitions: u32,
    fail_requests: bool,
}

/// In-memory booking service for development and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingService {
    state: Arc<RwLock<InMemoryBookingState>>,
}

impl InMemoryBookingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a booking.
    pub fn insert(&self, booking: Booking) {
        self.write().bookings.insert(booking.id, booking);
    }

    pub fn status(&self, booking_id: BookingId) -> Option<BookingStatus> {
        self.read().bookings.get(&booking_id).map(|b| b.status)
    }

    /// Overrides a booking's status, as the booking service would on its own.
    pub fn set_status(&self, booking_id: BookingId, status: BookingStatus) {
        if let Some(booking) = self.write().bookings.get_mut(&booking_id) {
            booking.status = status;
        }
    }

    /// Number of successful `Initializing → Pending` transitions.
    pub fn transition_count(&self) -> u32 {
        self.read().transitions
    }

    pub fn set_fail_requests(&self, fail: bool) {
        self.write().fail_requests = fail;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryBookingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryBookingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BookingServiceClient for InMemoryBookingService {
    async fn get_booking_with_status(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        status: BookingStatus,
    ) -> Result<Option<Booking>, ServiceClientError> {
        let state = self.read();
        if state.fail_requests {
            return Err(ServiceClientError::Unavailable("booking service".to_string()));
        }

        Ok(state
            .bookings
            .get(&booking_id)
            .filter(|b| b.user_id == user_id && b.status == status)
            .cloned())
    }

    async fn transition_initializing_to_pending(
        &self,
        booking_id: BookingId,
    ) -> Result<(), ServiceClientError> {
        let mut state = self.write();
        if state.fail_requests {
            return Err(ServiceClientError::Unavailable("booking service".to_string()));
        }

        let booking =
            state
                .bookings
                .get_mut(&booking_id)
                .ok_or(ServiceClientError::NotFound {
                    entity: "booking",
                    id: booking_id.as_i64(),
                })?;

        if booking.status != BookingStatus::Initializing {
            return Err(ServiceClientError::FailedPrecondition(format!(
                "booking {booking_id} is {}, expected initializing",
                booking.status
            )));
        }

        booking.status = BookingStatus::Pending;
        state.transitions += 1;
        Ok(())
    }
}

/// Booking service client speaking JSON over HTTP.
///
/// - `GET {base}/bookings/{id}?user_id=..&status=..` → 200 booking, 404 absent
/// - `POST {base}/bookings/{id}/pending` → 200, 404, 409/412 lost the race
#[derive(Debug, Clone)]
pub struct HttpBookingServiceClient {
    client: Client,
    base_url: String,
}

impl HttpBookingServiceClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BookingServiceClient for HttpBookingServiceClient {
    #[tracing::instrument(skip(self))]
    async fn get_booking_with_status(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        status: BookingStatus,
    ) -> Result<Option<Booking>, ServiceClientError> {
        let response = self
            .client
            .get(url_join(&self.base_url, &format!("bookings/{booking_id}")))
            .query(&[
                ("user_id", user_id.to_string()),
                ("status", status.as_str().to_string()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            _ => Err(read_error(response).await),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn transition_initializing_to_pending(
        &self,
        booking_id: BookingId,
    ) -> Result<(), ServiceClientError> {
        let response = self
            .client
            .post(url_join(
                &self.base_url,
                &format!("bookings/{booking_id}/pending"),
            ))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ServiceClientError::NotFound {
                entity: "booking",
                id: booking_id.as_i64(),
            }),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                let message = response.text().await.unwrap_or_default();
                Err(ServiceClientError::FailedPrecondition(message))
            }
            _ => Err(read_error(response).await),
        }
    }
}
