//! Classification of octocrab errors into the provider taxonomy.
//!
//! The same HTTP status means different things on different endpoints, so
//! classification takes the kind of call into account:
//!
//! - 404 is always `NotFound`.
//! - 409 from the merge endpoint is a content `Conflict`.
//! - 422 (or "not a fast forward") from a reference write is a `Conflict`:
//!   the ref already exists, or another writer moved it.
//! - Everything else, including timeouts, is `Transport`.

use std::time::Duration;

use crate::provider::{ProviderError, ProviderErrorKind};

/// What kind of endpoint a call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Read,
    Write,
    RefWrite,
    Merge,
}

/// Converts an octocrab error for a call described by `context`.
pub(crate) fn classify(err: octocrab::Error, call: CallKind, context: &str) -> ProviderError {
    let (status, detail) = match &err {
        octocrab::Error::GitHub { source, .. } => {
            (Some(source.status_code.as_u16()), source.message.clone())
        }
        other => {
            let message = other.to_string();
            (extract_status_code(&message), message)
        }
    };
    let kind = kind_for(status, &detail, call);

    let mut error = ProviderError::new(kind, format!("{context}: {detail}")).with_source(err);
    error.status_code = status;
    error
}

/// A call that exceeded its deadline.
pub(crate) fn timed_out(context: &str, timeout: Duration) -> ProviderError {
    ProviderError::transport(format!("{context}: timed out after {}s", timeout.as_secs()))
}

fn kind_for(status: Option<u16>, message: &str, call: CallKind) -> ProviderErrorKind {
    let fast_forward = message.to_lowercase().contains("not a fast forward");
    match (status, call) {
        (Some(404), _) => ProviderErrorKind::NotFound,
        (Some(409), CallKind::Merge) => ProviderErrorKind::Conflict,
        (Some(422), CallKind::RefWrite) => ProviderErrorKind::Conflict,
        (_, CallKind::RefWrite) if fast_forward => ProviderErrorKind::Conflict,
        _ => ProviderErrorKind::Transport,
    }
}

/// Best-effort status extraction for errors that are not GitHub responses.
fn extract_status_code(message: &str) -> Option<u16> {
    let idx = message.find("status: ")?;
    let digits: String = message[idx + 8..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
