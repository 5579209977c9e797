//! Shared types used across the payment saga crates.

pub mod types;

pub use types::{
    BookingId, MovieId, PaymentTransactionId, ScreenId, SeatId, ShowtimeId, TheaterId, UserId,
};
