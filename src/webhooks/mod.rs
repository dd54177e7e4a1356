//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - `pull_request` payload parsing into workflow tasks

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{Phase, PrAction, PullRequestEvent};
pub use parser::{ParseError, parse_webhook};
pub use signature::{SIGNATURE_HEADER, WebhookSecret, parse_signature_header};
