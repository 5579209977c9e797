//! Payment transaction endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BookingId, PaymentTransactionId, UserId};
use serde::{Deserialize, Serialize};
use transaction_store::{CheckoutSession, PaymentTransaction};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PaymentTransactionRequest {
    pub booking_id: BookingId,
    pub user_id: UserId,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutUrlResponse {
    pub checkout_url: String,
}

#[derive(Serialize)]
pub struct CancelResponse {}

#[derive(Serialize)]
pub struct CheckoutSessionResponse {
    pub external_session_id: String,
    pub url: String,
}

#[derive(Serialize)]
pub struct PaymentTransactionResponse {
    pub id: PaymentTransactionId,
    pub booking_id: BookingId,
    pub amount: i64,
    pub status: String,
    pub request_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub checkout_session: Option<CheckoutSessionResponse>,
}

impl PaymentTransactionResponse {
    fn new(transaction: PaymentTransaction, session: Option<CheckoutSession>) -> Self {
        Self {
            id: transaction.id,
            booking_id: transaction.booking_id,
            amount: transaction.amount,
            status: transaction.status.to_string(),
            request_time: transaction.request_time,
            update_time: transaction.update_time,
            checkout_session: session.map(|s| CheckoutSessionResponse {
                external_session_id: s.external_session_id,
                url: s.url,
            }),
        }
    }
}

// -- Handlers --

/// POST /payment-transactions — open (or reopen) a checkout page for a booking.
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentTransactionRequest>,
) -> Result<(StatusCode, Json<CheckoutUrlResponse>), ApiError> {
    let checkout_url = state
        .orchestrator
        .create_payment_transaction(req.booking_id, req.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(CheckoutUrlResponse { checkout_url })))
}

/// POST /payment-transactions/cancel — ask the provider to expire the
/// booking's checkout page. The transaction settles through the webhook.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentTransactionRequest>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    state
        .orchestrator
        .cancel_payment_transaction(req.booking_id, req.user_id)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(CancelResponse {})))
}

/// GET /payment-transactions/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentTransactionResponse>, ApiError> {
    let id: PaymentTransactionId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid payment transaction id: {e}")))?;
    let (transaction, session) = state.orchestrator.get_payment_transaction(id).await?;

    Ok(Json(PaymentTransactionResponse::new(transaction, session)))
}
