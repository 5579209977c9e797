use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingId, PaymentTransactionId};

/// The status of a payment transaction.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success
///           └──► Cancel
/// ```
///
/// Both `Success` and `Cancel` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentTransactionStatus {
    /// Waiting for the payment provider to report an outcome.
    #[default]
    Pending,

    /// The customer paid (terminal state).
    Success,

    /// The checkout expired, was cancelled, or the payment failed (terminal state).
    Cancel,
}

impl PaymentTransactionStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentTransactionStatus::Success | PaymentTransactionStatus::Cancel
        )
    }

    /// Returns true if a transaction in this state may move to `target`.
    pub fn can_transition_to(&self, target: PaymentTransactionStatus) -> bool {
        matches!(self, PaymentTransactionStatus::Pending) && target.is_terminal()
    }

    /// Returns the code stored in the `status` column.
    pub fn code(&self) -> i16 {
        match self {
            PaymentTransactionStatus::Pending => 0,
            PaymentTransactionStatus::Success => 1,
            PaymentTransactionStatus::Cancel => 2,
        }
    }

    /// Parses a `status` column code.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(PaymentTransactionStatus::Pending),
            1 => Some(PaymentTransactionStatus::Success),
            2 => Some(PaymentTransactionStatus::Cancel),
            _ => None,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTransactionStatus::Pending => "Pending",
            PaymentTransactionStatus::Success => "Success",
            PaymentTransactionStatus::Cancel => "Cancel",
        }
    }
}

impl std::fmt::Display for PaymentTransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt to collect payment for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    pub booking_id: BookingId,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub status: PaymentTransactionStatus,
    pub request_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Values for a transaction about to be inserted. New rows are always `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentTransaction {
    pub booking_id: BookingId,
    pub amount: i64,
    pub request_time: DateTime<Utc>,
}

impl NewPaymentTransaction {
    pub fn new(booking_id: BookingId, amount: i64, request_time: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            amount,
            request_time,
        }
    }
}
