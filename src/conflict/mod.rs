//! Conflict detection before a pick touches the target branch.
//!
//! Two interchangeable strategies answer "would this change apply cleanly to
//! that branch?" without mutating the branch:
//!
//! - **Local patch** ([`local`]): fetch the merge request's raw patch, check the
//!   target out in a local working copy, and run `git apply --check`.
//! - **Remote merge** ([`remote`]): probe with the forge's own merge endpoint on
//!   a disposable temporary branch, which also yields the merged tree.
//!
//! Which one runs is a function of the forge ([`check_conflict_mode`]), since
//! the two rely on disjoint API surfaces. Callers may override it explicitly.

pub mod local;
pub mod remote;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::git::GitError;
use crate::provider::{Commit, Provider, ProviderError, ProviderKind};
use crate::types::{PickOperation, PrNumber, Sha};

pub use remote::temp_ref_name;

/// Errors from conflict detection.
///
/// A genuine content conflict is always [`ConflictError::Conflict`]; the other
/// variants mean the check itself could not run.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Applying the change would conflict with the target branch.
    #[error("conflict picking into {target}: {details}")]
    Conflict { target: String, details: String },

    /// A provider call failed for a reason other than a conflict.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A local git command failed for a reason other than a conflict.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Writing the scratch patch file failed.
    #[error("patch file error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConflictError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictError::Conflict { .. })
    }
}

/// What a successful check learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCheck {
    /// The tree of the source change replayed onto the target tip, when the
    /// strategy computes one (remote merge does, local patch does not).
    pub merged_tree: Option<Sha>,
}

/// The strategy family, selectable by name on the CLI and in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    LocalPatch,
    RemoteMerge,
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictMode::LocalPatch => f.write_str("local-patch"),
            ConflictMode::RemoteMerge => f.write_str("remote-merge"),
        }
    }
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local-patch" | "local" | "command" => Ok(ConflictMode::LocalPatch),
            "remote-merge" | "remote" | "api" => Ok(ConflictMode::RemoteMerge),
            other => Err(format!(
                "unknown conflict mode {other:?} (expected local-patch or remote-merge)"
            )),
        }
    }
}

/// The default strategy for a forge.
pub fn check_conflict_mode(kind: &ProviderKind) -> ConflictMode {
    match kind {
        ProviderKind::GitHub => ConflictMode::LocalPatch,
        ProviderKind::Other(_) => ConflictMode::RemoteMerge,
    }
}

/// A fully resolved strategy with everything it needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictStrategy {
    LocalPatch {
        repo_path: PathBuf,
        merge_request: PrNumber,
        remote: String,
    },
    RemoteMerge,
}

impl ConflictStrategy {
    /// Resolves the strategy for one task.
    ///
    /// Local patch needs a working copy; without one it falls back to remote merge.
    pub fn resolve(
        kind: &ProviderKind,
        mode: Option<ConflictMode>,
        repo_path: Option<PathBuf>,
        merge_request: PrNumber,
    ) -> Self {
        match (mode.unwrap_or_else(|| check_conflict_mode(kind)), repo_path) {
            (ConflictMode::LocalPatch, Some(repo_path)) => ConflictStrategy::LocalPatch {
                repo_path,
                merge_request,
                remote: "origin".to_string(),
            },
            _ => ConflictStrategy::RemoteMerge,
        }
    }

    pub fn mode(&self) -> ConflictMode {
        match self {
            ConflictStrategy::LocalPatch { .. } => ConflictMode::LocalPatch,
            ConflictStrategy::RemoteMerge => ConflictMode::RemoteMerge,
        }
    }
}

/// Checks whether `op` would apply cleanly onto `target_tip`.
#[instrument(
    skip_all,
    fields(
        repo = %op.repo,
        target = %op.target,
        sha = %op.sha.short(),
        mode = %strategy.mode()
    )
)]
pub async fn check_conflict<P: Provider>(
    provider: &P,
    op: &PickOperation,
    source: &Commit,
    target_tip: &Commit,
    strategy: &ConflictStrategy,
) -> Result<ConflictCheck, ConflictError> {
    match strategy {
        ConflictStrategy::LocalPatch {
            repo_path,
            merge_request,
            remote,
        } => local::check_with_patch(provider, op, repo_path, *merge_request, remote).await,
        ConflictStrategy::RemoteMerge => {
            remote::check_with_merge(provider, op, source, target_tip).await
        }
    }
}
