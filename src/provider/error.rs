//! Provider error taxonomy.
//!
//! Every provider call can fail in one of four ways, and callers must be able
//! to tell them apart:
//!
//! - **Transport**: network, auth, rate limit, timeouts, unexpected HTTP
//!   statuses. Always surfaced, never retried inside the engine.
//! - **NotFound**: a missing ref or commit. Fails the current operation only.
//! - **Conflict**: a content conflict or a lost reference-update race.
//! - **InvalidOptions**: a malformed request, caught before any I/O.

use std::fmt;

use thiserror::Error;

/// The kind of provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Transport,
    NotFound,
    Conflict,
    InvalidOptions,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Transport => "transport error",
            ProviderErrorKind::NotFound => "not found",
            ProviderErrorKind::Conflict => "conflict",
            ProviderErrorKind::InvalidOptions => "invalid options",
        };
        f.write_str(s)
    }
}

/// An error returned by a forge provider.
#[derive(Debug, Error)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,

    /// The HTTP status code, if the failure came from an HTTP response.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying client error, if available.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        ProviderError {
            kind,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Conflict, message)
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidOptions, message)
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ProviderErrorKind::Conflict
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ProviderErrorKind::Transport
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;
