//! Remote-merge conflict detection.
//!
//! Probes mergeability with the forge's own merge endpoint, without a local
//! checkout and without touching the real target branch:
//!
//! 1. Create a temporary branch at the target's tip.
//! 2. Create a "sibling" of the source commit: the target tip's tree, parented
//!    on the source's first parent, and force the temporary branch onto it.
//! 3. Merge the source commit into the temporary branch. The merge base is the
//!    source's parent, so the forge replays exactly the source's diff onto the
//!    target's content.
//! 4. A 409 is a conflict; otherwise the merged tree is the pick's tree.
//!
//! The temporary branch name is derived from the target and the source SHA,
//! so two concurrent attempts at the same pick collide on creation instead of
//! leaking two scratch branches. It is deleted on every exit path.

use tracing::{debug, warn};

use crate::provider::{
    Commit, CommitProvider, MergeOutcome, MergeProvider, NewCommit, Provider, ProviderError,
    ProviderResult, ReferenceProvider,
};
use crate::types::{PickOperation, RepoId, Sha};

use super::{ConflictCheck, ConflictError};

const TEMP_BRANCH_PREFIX: &str = "pick-train";

/// The temporary branch name (without `refs/heads/`) for a pick.
fn temp_branch_name(target: &str, sha: &Sha) -> String {
    format!("{TEMP_BRANCH_PREFIX}/{target}-{sha}")
}

/// The fully qualified temporary reference for a pick.
pub fn temp_ref_name(target: &str, sha: &Sha) -> String {
    format!("refs/heads/{}", temp_branch_name(target, sha))
}

/// A temporary branch that must be released with [`TempRef::release`].
struct TempRef<'a, P: ReferenceProvider> {
    provider: &'a P,
    repo: &'a RepoId,
    branch: String,
    released: bool,
}

impl<'a, P: ReferenceProvider + Sync> TempRef<'a, P> {
    async fn acquire(
        provider: &'a P,
        repo: &'a RepoId,
        branch: String,
        at: &Sha,
    ) -> ProviderResult<Self> {
        provider
            .create_reference(repo, &format!("refs/heads/{branch}"), at)
            .await?;
        debug!(temp_ref = %branch, "Created temporary branch");
        Ok(TempRef {
            provider,
            repo,
            branch,
            released: false,
        })
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    /// Deletes the branch. Failure is logged, never propagated.
    async fn release(mut self) {
        self.released = true;
        match self
            .provider
            .delete_reference(self.repo, &self.ref_name())
            .await
        {
            Ok(()) => debug!(temp_ref = %self.branch, "Deleted temporary branch"),
            Err(e) => warn!(
                temp_ref = %self.branch,
                error = %e,
                "Failed to delete temporary branch"
            ),
        }
    }
}

impl<P: ReferenceProvider> Drop for TempRef<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                repo = %self.repo,
                temp_ref = %self.branch,
                "Temporary branch dropped without release; it must be deleted by hand"
            );
        }
    }
}

pub async fn check_with_merge<P: Provider>(
    provider: &P,
    op: &PickOperation,
    source: &Commit,
    target_tip: &Commit,
) -> Result<ConflictCheck, ConflictError> {
    let first_parent = source.parents.first().ok_or_else(|| {
        ProviderError::invalid_options(format!("{} is a root commit and cannot be picked", op.sha))
    })?;

    let branch = temp_branch_name(&op.target, &op.sha);
    let temp = match TempRef::acquire(provider, &op.repo, branch, &target_tip.sha).await {
        Ok(temp) => temp,
        Err(e) if e.is_conflict() => {
            return Err(ConflictError::Conflict {
                target: op.target.clone(),
                details: "another attempt at this pick is in progress".to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let outcome = probe(provider, &temp, op, first_parent, target_tip).await;
    temp.release().await;
    outcome
}

async fn probe<P: Provider>(
    provider: &P,
    temp: &TempRef<'_, P>,
    op: &PickOperation,
    first_parent: &Sha,
    target_tip: &Commit,
) -> Result<ConflictCheck, ConflictError> {
    let sibling = provider
        .create_commit(
            &op.repo,
            &NewCommit {
                message: format!("Sibling of {}", op.sha),
                tree: target_tip.tree.sha.clone(),
                parents: vec![first_parent.clone()],
            },
        )
        .await?;

    provider
        .update_reference(&op.repo, &temp.ref_name(), &sibling.sha, true)
        .await?;

    let message = format!("Merge {} into {}", op.sha.short(), temp.branch());
    match provider
        .merge(&op.repo, temp.branch(), &op.sha, &message)
        .await
    {
        Ok(MergeOutcome::Merged(merged)) => {
            debug!(tree = %merged.tree.sha, "Forge merge succeeded");
            Ok(ConflictCheck {
                merged_tree: Some(merged.tree.sha),
            })
        }
        Ok(MergeOutcome::NothingToMerge) => Ok(ConflictCheck {
            merged_tree: Some(target_tip.tree.sha.clone()),
        }),
        Err(e) if e.is_conflict() => Err(ConflictError::Conflict {
            target: op.target.clone(),
            details: e.message,
        }),
        Err(e) => Err(e.into()),
    }
}
