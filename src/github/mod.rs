//! GitHub binding of the provider contract.
//!
//! Built on octocrab's REST client:
//! - git data endpoints for commits and refs
//! - the repository merges endpoint for remote conflict checks
//! - issue comments for the summary and result comments
//!
//! Errors are classified into the provider taxonomy by endpoint, and every
//! request carries a deadline. Authentication is a token or a GitHub App
//! installation.

mod client;
mod error;

pub use client::{DEFAULT_REQUEST_TIMEOUT, GitHubAuth, GitHubProvider, GitHubProviderFactory};
