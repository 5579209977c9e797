//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use saga::CheckoutSettings;
use saga::settings::{
    DEFAULT_CHECKOUT_TIMEOUT_SECS, DEFAULT_CURRENCY, DEFAULT_DISPLAY_OFFSET_MINUTES,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: PostgreSQL; in-memory
///   storage when the URL is unset
/// - `STRIPE_API_KEY`, `STRIPE_API_BASE`: Stripe; in-memory gateway when the
///   key is unset
/// - `STRIPE_WEBHOOK_ENDPOINT_SECRET` (required with `STRIPE_API_KEY`),
///   `STRIPE_WEBHOOK_TOLERANCE_SECS`
/// - `CHECKOUT_TIMEOUT_SECS`, `CHECKOUT_CURRENCY`, `CHECKOUT_SUCCESS_URL`,
///   `CHECKOUT_CANCEL_URL`, `CHECKOUT_DISPLAY_UTC_OFFSET_MINUTES`
/// - `BOOKING_SERVICE_URL`, `CATALOG_SERVICE_URL`, `PAYMENT_EVENTS_URL`:
///   collaborator base URLs; in-memory stand-ins when unset
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub stripe_api_key: Option<String>,
    pub stripe_api_base: String,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_webhook_tolerance_secs: u64,
    pub checkout_timeout_secs: i64,
    pub checkout_currency: String,
    pub checkout_success_url: Option<String>,
    pub checkout_cancel_url: Option<String>,
    pub display_utc_offset_minutes: i32,
    pub booking_service_url: Option<String>,
    pub catalog_service_url: Option<String>,
    pub payment_events_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset; unparsable numbers fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_var(get("PORT")).unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_var(get("LOG_FORMAT")).unwrap_or(defaults.log_format),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_var(get("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            stripe_api_key: get("STRIPE_API_KEY"),
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_ENDPOINT_SECRET"),
            stripe_webhook_tolerance_secs: parse_var(get("STRIPE_WEBHOOK_TOLERANCE_SECS"))
                .unwrap_or(defaults.stripe_webhook_tolerance_secs),
            checkout_timeout_secs: parse_var(get("CHECKOUT_TIMEOUT_SECS"))
                .unwrap_or(defaults.checkout_timeout_secs),
            checkout_currency: get("CHECKOUT_CURRENCY").unwrap_or(defaults.checkout_currency),
            checkout_success_url: get("CHECKOUT_SUCCESS_URL"),
            checkout_cancel_url: get("CHECKOUT_CANCEL_URL"),
            display_utc_offset_minutes: parse_var(get("CHECKOUT_DISPLAY_UTC_OFFSET_MINUTES"))
                .unwrap_or(defaults.display_utc_offset_minutes),
            booking_service_url: get("BOOKING_SERVICE_URL"),
            catalog_service_url: get("CATALOG_SERVICE_URL"),
            payment_events_url: get("PAYMENT_EVENTS_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn webhook_tolerance(&self) -> Duration {
        Duration::from_secs(self.stripe_webhook_tolerance_secs)
    }

    /// Settings handed to the orchestrator.
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            checkout_timeout: TimeDelta::seconds(self.checkout_timeout_secs.max(1)),
            currency: self.checkout_currency.to_ascii_lowercase(),
            success_url: self.checkout_success_url.clone(),
            cancel_url: self.checkout_cancel_url.clone(),
            display_offset: CheckoutSettings::offset_from_minutes(self.display_utc_offset_minutes),
        }
    }
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            stripe_api_key: None,
            stripe_api_base: checkout::DEFAULT_API_BASE.to_string(),
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: checkout::DEFAULT_TOLERANCE.as_secs(),
            checkout_timeout_secs: DEFAULT_CHECKOUT_TIMEOUT_SECS,
            checkout_currency: DEFAULT_CURRENCY.to_string(),
            checkout_success_url: None,
            checkout_cancel_url: None,
            display_utc_offset_minutes: DEFAULT_DISPLAY_OFFSET_MINUTES,
            booking_service_url: None,
            catalog_service_url: None,
            payment_events_url: None,
        }
    }
}
