use chrono::{FixedOffset, Offset, TimeDelta, Utc};

/// Default lifetime of a hosted checkout page, in seconds.
pub const DEFAULT_CHECKOUT_TIMEOUT_SECS: i64 = 30 * 60;

/// Default currency of ticket prices.
pub const DEFAULT_CURRENCY: &str = "vnd";

/// Default offset used to print showtimes on the checkout page (UTC+7).
pub const DEFAULT_DISPLAY_OFFSET_MINUTES: i32 = 7 * 60;

/// Knobs for the checkout pages the orchestrator opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// How long the provider keeps a checkout page open.
    pub checkout_timeout: TimeDelta,
    pub currency: String,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub display_offset: FixedOffset,
}

impl CheckoutSettings {
    /// Builds a display offset from minutes east of UTC, falling back to UTC
    /// when out of range.
    pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            checkout_timeout: TimeDelta::seconds(DEFAULT_CHECKOUT_TIMEOUT_SECS),
            currency: DEFAULT_CURRENCY.to_string(),
            success_url: None,
            cancel_url: None,
            display_offset: Self::offset_from_minutes(DEFAULT_DISPLAY_OFFSET_MINUTES),
        }
    }
}
