use serde::{Deserialize, Serialize};

use crate::PaymentTransactionId;

/// Provider-hosted checkout page registered for a payment transaction.
///
/// Written once, right after the provider accepted the session, and never
/// updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub payment_transaction_id: PaymentTransactionId,
    /// Opaque session id assigned by the provider.
    pub external_session_id: String,
    pub url: String,
}

impl CheckoutSession {
    pub fn new(
        payment_transaction_id: PaymentTransactionId,
        external_session_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            payment_transaction_id,
            external_session_id: external_session_id.into(),
            url: url.into(),
        }
    }
}
