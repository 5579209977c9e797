use chrono::{DateTime, FixedOffset, Utc};
use common::{BookingId, PaymentTransactionId, UserId};
use serde::{Deserialize, Serialize};

/// Product name shown on the hosted checkout page.
pub const LINE_ITEM_NAME: &str = "Movie ticket booking";

/// Display details of the single ticket being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLineItem {
    pub movie_title: String,
    pub seat_no: String,
    pub showtime_start: DateTime<Utc>,
    pub theater_name: String,
    pub screen_name: String,
}

impl TicketLineItem {
    /// Renders the line item description, with the showtime in `offset`.
    pub fn description(&self, offset: FixedOffset) -> String {
        let start = self
            .showtime_start
            .with_timezone(&offset)
            .format("%A, %d/%m/%Y %H:%M:%S");

        format!(
            "Movie: {} | Seat: {} | Date: {} | Theater: {} | Screen: {}",
            self.movie_title, self.seat_no, start, self.theater_name, self.screen_name
        )
    }
}

/// Everything a gateway needs to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub payment_transaction_id: PaymentTransactionId,
    pub user_id: UserId,
    pub booking_id: BookingId,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub line_item: TicketLineItem,
    /// The provider expires the session on its own at this instant.
    pub expires_at: DateTime<Utc>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    /// Offset used to print the showtime in the description.
    pub display_offset: FixedOffset,
}

impl CheckoutSessionRequest {
    pub fn description(&self) -> String {
        self.line_item.description(self.display_offset)
    }
}

/// A session the provider accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCheckoutSession {
    pub external_session_id: String,
    pub url: String,
}
