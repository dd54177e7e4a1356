//! Webhook endpoint handler.
//!
//! Accepts GitHub webhook deliveries, validates signatures, turns effective
//! `pull_request` events into tasks and queues them before returning
//! 202 Accepted. The workflow itself runs asynchronously on the executor.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::executor::ExecutorError;
use crate::provider::ProviderFactory;
use crate::types::DeliveryId;
use crate::webhooks::{ParseError, SIGNATURE_HEADER, parse_webhook};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Invalid signature.
    #[error("invalid signature")]
    InvalidSignature,

    /// Malformed payload.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),

    /// The executor no longer accepts work.
    #[error("server is shutting down")]
    ShuttingDown(#[from] ExecutorError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::ShuttingDown(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 202 Accepted: a task was queued
/// - 200 OK (`Ignored`): the event does not trigger the workflow
/// - 400 Bad Request: missing header or malformed payload
/// - 401 Unauthorized: invalid signature
/// - 503 Service Unavailable: shutting down
pub async fn webhook_handler<F: ProviderFactory>(
    State(app_state): State<AppState<F>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = DeliveryId::new(get_header(&headers, HEADER_DELIVERY)?);
    let signature_header = get_header(&headers, SIGNATURE_HEADER)?;

    debug!(delivery_id = %delivery_id, event_type = %event_type, "Received webhook");

    // Verify the signature before parsing anything.
    if !app_state.webhook_secret().verify(&body, &signature_header) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let Some(event) = parse_webhook(&event_type, &body)? else {
        debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring event");
        return Ok((StatusCode::OK, "Ignored"));
    };
    let Some(task) = event.to_task(&app_state.settings().branches) else {
        debug!(delivery_id = %delivery_id, action = ?event.action, "Ignoring action");
        return Ok((StatusCode::OK, "Ignored"));
    };

    app_state.submit(task, delivery_id.clone())?;
    info!(
        delivery_id = %delivery_id,
        repo = %event.repo,
        pr = %event.pr_number,
        action = ?event.action,
        "Task queued"
    );
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
