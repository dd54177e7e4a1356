//! HTTP server for the pick bot.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts GitHub webhook deliveries (returns 202 Accepted)
//! - `GET /health` - Returns 200 if server is running

pub mod state;
pub mod webhook;

use axum::http::StatusCode;

use crate::provider::ProviderFactory;

pub use state::{AppState, PickSettings};
pub use webhook::{WebhookError, webhook_handler};

/// Liveness probe.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Builds the axum Router with all endpoints.
pub fn build_router<F: ProviderFactory>(app_state: AppState<F>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<F>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
