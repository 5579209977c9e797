//! HTTP API for the movie booking payment service.
//!
//! Exposes the payment transaction saga over REST, receives payment provider
//! webhooks, and reports structured logs (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::{AppState, Dependencies};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/payment-transactions",
            post(routes::payment_transactions::create),
        )
        .route(
            "/payment-transactions/cancel",
            post(routes::payment_transactions::cancel),
        )
        .route(
            "/payment-transactions/{id}",
            get(routes::payment_transactions::get),
        )
        .route("/webhook", post(routes::webhook::receive))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
