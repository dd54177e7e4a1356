//! The pick engine: replays one commit onto one branch through the forge API.
//!
//! A pick is a sequence of non-transactional REST calls (read ref, read
//! commits, create commit, move ref). The engine orders them so that nothing
//! is written until every check has passed, and so that re-running a pick
//! that already landed is a no-op:
//!
//! 1. Read `refs/heads/<target>`. A missing branch fails before any write.
//! 2. Read the source commit.
//! 3. Read the target's tip commit.
//! 4. If the tip's message digest equals the pick message digest, the tip
//!    already *is* this pick. Return [`PickOutcome::AlreadyApplied`].
//! 5. Run the conflict detector. A conflict aborts before any write.
//! 6. Create the pick commit on top of the tip (single parent, linear history).
//! 7. Fast-forward the target to it. A rejected fast-forward means another
//!    writer moved the branch, which is a conflict, never an overwrite.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::conflict::{ConflictError, ConflictStrategy, check_conflict};
use crate::provider::{CommitProvider, NewCommit, Provider, ProviderError, ReferenceProvider};
use crate::types::{PickOperation, Sha};

/// Errors from a single pick.
#[derive(Debug, Error)]
pub enum PickError {
    /// A forge call failed (transport, missing ref or commit, bad request).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The conflict detector reported a conflict or could not run.
    #[error(transparent)]
    Detector(#[from] ConflictError),

    /// The target moved between reading its tip and updating it.
    #[error("{target} moved while picking, update rejected: {details}")]
    Raced { target: String, details: String },
}

impl PickError {
    /// True for content conflicts and lost update races, the cases that need a
    /// human rather than a retry.
    pub fn is_conflict(&self) -> bool {
        match self {
            PickError::Detector(e) => e.is_conflict(),
            PickError::Raced { .. } => true,
            PickError::Provider(e) => e.is_conflict(),
        }
    }
}

/// What a successful pick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// A new commit was created and the target fast-forwarded to it.
    Picked { commit: Sha },
    /// The target's tip already carries this pick; nothing was written.
    AlreadyApplied,
}

/// The message of a picked commit.
pub fn pick_message(source_message: &str, sha: &Sha) -> String {
    format!(
        "{source_message}\n\n(cherry picked from commit {})",
        sha.short()
    )
}

/// Hex SHA-256 of a commit message, used to recognise an existing pick.
pub fn message_digest(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Picks `op.sha` onto `op.target`.
#[instrument(skip_all, fields(repo = %op.repo, target = %op.target, sha = %op.sha.short()))]
pub async fn perform_pick<P: Provider>(
    provider: &P,
    op: &PickOperation,
    strategy: &ConflictStrategy,
) -> Result<PickOutcome, PickError> {
    let target_ref = provider.get_reference(&op.repo, &op.target_ref()).await?;
    let source = provider.get_commit(&op.repo, &op.sha).await?;
    let tip = provider.get_commit(&op.repo, &target_ref.sha).await?;

    let message = pick_message(&source.message, &op.sha);
    if message_digest(&tip.message) == message_digest(&message) {
        info!(tip = %tip.sha.short(), "Target tip already carries this pick");
        return Ok(PickOutcome::AlreadyApplied);
    }

    let check = check_conflict(provider, op, &source, &tip, strategy).await?;
    let tree = check.merged_tree.unwrap_or_else(|| source.tree.sha.clone());

    let commit = provider
        .create_commit(
            &op.repo,
            &NewCommit {
                message,
                tree,
                parents: vec![tip.sha.clone()],
            },
        )
        .await?;
    debug!(commit = %commit.sha, "Created pick commit");

    match provider
        .update_reference(&op.repo, &op.target_ref(), &commit.sha, false)
        .await
    {
        Ok(_) => {}
        Err(e) if e.is_conflict() => {
            return Err(PickError::Raced {
                target: op.target.clone(),
                details: e.message,
            });
        }
        Err(e) => return Err(e.into()),
    }

    info!(commit = %commit.sha.short(), "Picked");
    Ok(PickOutcome::Picked { commit: commit.sha })
}
