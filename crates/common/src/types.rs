use serde::{Deserialize, Serialize};

/// Declares an integer identifier newtype.
///
/// Every service in the platform keys its rows with integer ids, so the
/// wrappers only exist to keep a booking id from being passed where a
/// transaction id is expected.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates the identifier from its raw value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type!(
    /// Identifier of a booking owned by the booking service.
    BookingId
);

id_type!(
    /// Identifier of a platform user.
    UserId
);

id_type!(
    /// Identifier of a local payment transaction row.
    PaymentTransactionId
);

id_type!(
    /// Identifier of a scheduled screening.
    ShowtimeId
);

id_type!(MovieId);

id_type!(SeatId);

id_type!(ScreenId);

id_type!(TheaterId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_preserve_raw_value() {
        let id = BookingId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(BookingId::from(42), id);
    }

    #[test]
    fn ids_parse_from_strings() {
        let id: PaymentTransactionId = " 17 ".parse().unwrap();
        assert_eq!(id, PaymentTransactionId::new(17));
        assert!("seventeen".parse::<PaymentTransactionId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserId::new(7));
    }

    #[test]
    fn display_prints_raw_value() {
        assert_eq!(PaymentTransactionId::new(5).to_string(), "5");
    }
}
