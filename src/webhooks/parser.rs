//! GitHub webhook payload parser.
//!
//! Only `pull_request` events matter to the bot. Other event types and
//! irrelevant actions parse to `Ok(None)` (ignored, not an error); malformed
//! payloads are `Err`.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{InstallationId, PrNumber, RepoId, Sha};

use super::events::{PrAction, PullRequestEvent};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g., malformed SHA or repository name).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload.
///
/// `event_type` is the `X-GitHub-Event` header value.
pub fn parse_webhook(
    event_type: &str,
    payload: &[u8],
) -> Result<Option<PullRequestEvent>, ParseError> {
    match event_type {
        "pull_request" => parse_pull_request(payload),
        _ => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
    repository: RawRepository,
    installation: Option<RawInstallation>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    merged: Option<bool>,
    merge_commit_sha: Option<String>,
    base: RawRef,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

fn parse_pull_request(payload: &[u8]) -> Result<Option<PullRequestEvent>, ParseError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;

    let action = match raw.action.as_str() {
        "opened" => PrAction::Opened,
        "reopened" => PrAction::Reopened,
        "edited" => PrAction::Edited,
        "closed" => PrAction::Closed,
        "merged" => PrAction::Merged,
        _ => return Ok(None),
    };

    let repo: RepoId = raw
        .repository
        .full_name
        .parse()
        .map_err(|_| ParseError::InvalidField {
            field: "repository.full_name",
            value: raw.repository.full_name.clone(),
        })?;

    let merge_commit_sha = match raw.pull_request.merge_commit_sha {
        Some(sha) => Some(Sha::parse(&sha).map_err(|_| ParseError::InvalidField {
            field: "pull_request.merge_commit_sha",
            value: sha.clone(),
        })?),
        None => None,
    };

    Ok(Some(PullRequestEvent {
        repo,
        action,
        pr_number: PrNumber(raw.pull_request.number),
        merged: raw.pull_request.merged.unwrap_or(action == PrAction::Merged),
        merge_commit_sha,
        base_branch: raw.pull_request.base.ref_name,
        installation: raw.installation.map(|i| InstallationId(i.id)),
    }))
}
