//! Local-patch conflict detection.
//!
//! The merge request's raw patch is written to a scratch file, the target
//! branch is checked out in a private detached worktree of the local clone,
//! and `git apply --check` decides there. Concurrent checks against the same
//! clone never see each other's checkout.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::git::{self, GitError, ScratchWorktree};
use crate::provider::MergeProvider;
use crate::types::{PickOperation, PrNumber};

use super::{ConflictCheck, ConflictError};

pub async fn check_with_patch<P: MergeProvider + Sync>(
    provider: &P,
    op: &PickOperation,
    repo_path: &Path,
    merge_request: PrNumber,
    remote: &str,
) -> Result<ConflictCheck, ConflictError> {
    let patch = provider.pull_request_patch(&op.repo, merge_request).await?;

    // Removed when `patch_file` drops.
    let mut patch_file = tempfile::Builder::new()
        .prefix("pick-train-")
        .suffix(".patch")
        .tempfile()?;
    patch_file.write_all(patch.as_bytes())?;
    patch_file.flush()?;

    debug!(
        patch = %patch_file.path().display(),
        bytes = patch.len(),
        "Wrote merge request patch"
    );

    let workdir: PathBuf = repo_path.to_path_buf();
    let patch_path = patch_file.path().to_path_buf();
    let target = op.target.clone();
    let remote = remote.to_string();
    let label = format!("{}-{}", op.target, op.sha.short());

    let outcome = tokio::task::spawn_blocking(move || -> Result<(), GitError> {
        let worktree = ScratchWorktree::for_remote_branch(&workdir, &remote, &target, &label)?;
        git::apply_check(worktree.path(), &patch_path)
    })
    .await
    .map_err(|e| ConflictError::Io(std::io::Error::other(e)))?;

    drop(patch_file);

    match outcome {
        Ok(()) => {
            info!("Patch applies cleanly");
            Ok(ConflictCheck { merged_tree: None })
        }
        Err(GitError::PatchDoesNotApply { details }) => {
            info!(details = %details, "Patch does not apply");
            Err(ConflictError::Conflict {
                target: op.target.clone(),
                details,
            })
        }
        Err(e) => Err(ConflictError::Git(e)),
    }
}
