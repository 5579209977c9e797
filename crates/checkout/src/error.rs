use thiserror::Error;

/// Errors raised by checkout gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The webhook signature header is missing, malformed, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// The webhook body could not be parsed into an event.
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// The provider rejected the request.
    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The request never got a usable answer from the provider.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider created a session without a redirect URL.
    #[error("Checkout session {0} has no redirect URL")]
    MissingUrl(String),

    /// The gateway cannot be built from the supplied settings.
    #[error("Invalid gateway configuration: {0}")]
    Configuration(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
