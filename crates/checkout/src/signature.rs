//! Webhook signature verification.
//!
//! The provider signs every delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`. Each `v1` value is an
//! HMAC-SHA256 over `"<t>.<raw body>"` keyed with the endpoint secret. Several
//! `v1` entries appear while the endpoint secret is being rolled.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Default accepted age of a signed delivery.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Verifies webhook signatures against an endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Verifies `header` against `payload` at the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, Utc::now())
    }

    /// Verifies `header` against `payload` as if the current time were `now`.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<()> {
        let parsed = ParsedHeader::parse(header)?;

        let age = now.timestamp() - parsed.timestamp;
        if age.unsigned_abs() > self.tolerance.as_secs() {
            return Err(GatewayError::InvalidSignature(format!(
                "timestamp outside tolerance ({age}s)"
            )));
        }

        for candidate in &parsed.signatures {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            let mac = self.mac(parsed.timestamp, payload)?;
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(GatewayError::InvalidSignature(
            "no matching signature".to_string(),
        ))
    }

    /// Builds a signature header for `payload` at `timestamp`.
    ///
    /// Used to sign test deliveries and by the in-memory gateway.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let mac = self.mac(timestamp, payload)?;
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> ParsedHeader<'a> {
    fn parse(header: &'a str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        GatewayError::InvalidSignature("invalid timestamp".to_string())
                    })?);
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(GatewayError::InvalidSignature(
                "missing v1 signature".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test_secret")
    }

    #[test]
    fn test_signed_payload_verifies() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp()).unwrap();

        assert!(verifier().verify_at(PAYLOAD, &header, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp()).unwrap();

        let result = verifier().verify_at(b"{}", &header, now);
        assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = Utc::now();
        let header = WebhookVerifier::new("whsec_other")
            .sign(PAYLOAD, now.timestamp())
            .unwrap();

        assert!(verifier().verify_at(PAYLOAD, &header, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp() - 301).unwrap();

        assert!(verifier().verify_at(PAYLOAD, &header, now).is_err());

        let lenient = verifier().with_tolerance(Duration::from_secs(600));
        assert!(lenient.verify_at(PAYLOAD, &header, now).is_ok());
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp()).unwrap();
        let rolled = header.replacen("v1=", "v1=deadbeef,v1=", 1);

        assert!(verifier().verify_at(PAYLOAD, &rolled, now).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let now = Utc::now();

        for header in ["", "v1=abc", "t=abc,v1=abc", "t=123"] {
            assert!(
                matches!(
                    verifier().verify_at(PAYLOAD, header, now),
                    Err(GatewayError::InvalidSignature(_))
                ),
                "header {header:?} should be rejected"
            );
        }
    }
}
