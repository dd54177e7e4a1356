//! The forge provider capability contract.
//!
//! The core never talks to a forge directly. It depends on four capability
//! groups, each a separate trait, which a forge binding implements
//! independently:
//!
//! - [`CommitProvider`]: read and create commits
//! - [`ReferenceProvider`]: read, create, move, and delete refs
//! - [`CommentProvider`]: list, create, and edit merge request comments
//! - [`MergeProvider`]: the forge's native merge endpoint and raw patches
//!
//! [`Provider`] is the aggregate the workflow needs, plus the forge identity
//! used to choose a conflict detection strategy.
//!
//! All methods return `impl Future + Send` so implementations can be driven
//! from spawned tasks.

mod error;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{CommentId, InstallationId, PrNumber, RepoId, Sha};

pub use error::{ProviderError, ProviderErrorKind, ProviderResult};

// ─── Forge data ───────────────────────────────────────────────────────────────

/// One entry of a git tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub kind: String,
    pub sha: Sha,
    pub size: Option<u64>,
}

/// A git tree snapshot. Forges may omit `entries` when only the SHA is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub sha: Sha,
    #[serde(default)]
    pub entries: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

impl Tree {
    /// A tree known only by its SHA.
    pub fn from_sha(sha: Sha) -> Self {
        Tree {
            sha,
            entries: Vec::new(),
            truncated: false,
        }
    }
}

/// A commit snapshot, fetched per operation and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: Sha,
    pub message: String,
    pub tree: Tree,
    pub parents: Vec<Sha>,
}

/// A git reference and the object it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Fully qualified name, e.g. `refs/heads/main`.
    pub name: String,
    pub sha: Sha,
}

/// A merge request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
}

/// Request to create a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree: Sha,
    pub parents: Vec<Sha>,
}

/// What the forge's merge endpoint did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A merge commit was created on the base.
    Merged(Commit),
    /// The head was already contained in the base.
    NothingToMerge,
}

/// Which forge a provider talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    Other(String),
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::GitHub => f.write_str("github"),
            ProviderKind::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "gh" | "github" => ProviderKind::GitHub,
            other => ProviderKind::Other(other.to_string()),
        })
    }
}

// ─── Capabilities ─────────────────────────────────────────────────────────────

/// Commit capability.
pub trait CommitProvider {
    /// Fetches a commit. A missing commit is `NotFound`.
    fn get_commit(
        &self,
        repo: &RepoId,
        sha: &Sha,
    ) -> impl Future<Output = ProviderResult<Commit>> + Send;

    /// Creates a commit object. Does not move any reference.
    fn create_commit(
        &self,
        repo: &RepoId,
        commit: &NewCommit,
    ) -> impl Future<Output = ProviderResult<Commit>> + Send;
}

/// Reference capability.
pub trait ReferenceProvider {
    /// Fetches a fully qualified ref (e.g. `refs/heads/main`).
    fn get_reference(
        &self,
        repo: &RepoId,
        name: &str,
    ) -> impl Future<Output = ProviderResult<Reference>> + Send;

    /// Creates a ref. An already existing ref is `Conflict`.
    fn create_reference(
        &self,
        repo: &RepoId,
        name: &str,
        sha: &Sha,
    ) -> impl Future<Output = ProviderResult<Reference>> + Send;

    /// Moves a ref. Without `force`, a non-fast-forward move is `Conflict`.
    fn update_reference(
        &self,
        repo: &RepoId,
        name: &str,
        sha: &Sha,
        force: bool,
    ) -> impl Future<Output = ProviderResult<Reference>> + Send;

    /// Deletes a ref.
    fn delete_reference(
        &self,
        repo: &RepoId,
        name: &str,
    ) -> impl Future<Output = ProviderResult<()>> + Send;
}

/// Comment capability.
pub trait CommentProvider {
    /// Lists all comments on a merge request, oldest first.
    fn find_comments(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
    ) -> impl Future<Output = ProviderResult<Vec<Comment>>> + Send;

    fn create_comment(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
        body: &str,
    ) -> impl Future<Output = ProviderResult<Comment>> + Send;

    fn update_comment(
        &self,
        repo: &RepoId,
        comment: CommentId,
        body: &str,
    ) -> impl Future<Output = ProviderResult<Comment>> + Send;
}

/// Merge capability.
pub trait MergeProvider {
    /// Merges `head` into the branch `base` using the forge's merge endpoint.
    /// A content conflict is `Conflict`.
    fn merge(
        &self,
        repo: &RepoId,
        base: &str,
        head: &Sha,
        message: &str,
    ) -> impl Future<Output = ProviderResult<MergeOutcome>> + Send;

    /// Returns the raw patch of a merge request.
    fn pull_request_patch(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
    ) -> impl Future<Output = ProviderResult<String>> + Send;
}

/// Everything the workflow needs from a forge.
pub trait Provider:
    CommitProvider + ReferenceProvider + CommentProvider + MergeProvider + Send + Sync
{
    fn kind(&self) -> ProviderKind;
}

/// Builds providers authenticated for an event's installation.
///
/// The webhook server holds one factory and asks it for a provider per task.
pub trait ProviderFactory: Send + Sync + 'static {
    type Provider: Provider + 'static;

    fn for_installation(
        &self,
        installation: Option<InstallationId>,
    ) -> impl Future<Output = ProviderResult<Arc<Self::Provider>>> + Send;
}
