//! Private detached worktrees for conflict checks.
//!
//! Concurrent checks share one clone but never its checkout. Each check gets
//! its own worktree pinned to the commit it resolved, and the worktree is
//! removed when the guard drops. Commands that write the clone's shared
//! metadata (fetch, `worktree add`, `worktree remove`) run under a per-clone
//! lock; the check itself runs outside it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use tempfile::TempDir;
use tracing::warn;

use super::{GitResult, fetch_branch, rev_parse, run_git_sync};

static CLONE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

fn clone_lock(repo: &Path) -> Arc<Mutex<()>> {
    let key = repo.canonicalize().unwrap_or_else(|_| repo.to_path_buf());
    let mut locks = CLONE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

/// Runs `f` while holding the lock for the clone at `repo`.
pub fn with_clone_lock<T>(repo: &Path, f: impl FnOnce() -> T) -> T {
    let lock = clone_lock(repo);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Keeps worktree directory names readable and path-safe.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// A detached worktree of a shared clone, removed on drop.
#[derive(Debug)]
pub struct ScratchWorktree {
    repo: PathBuf,
    dir: TempDir,
    commit: String,
}

impl ScratchWorktree {
    /// Fetches `branch` from `remote` and checks its tip out in a fresh
    /// detached worktree. `label` only names the directory.
    pub fn for_remote_branch(
        repo: &Path,
        remote: &str,
        branch: &str,
        label: &str,
    ) -> GitResult<Self> {
        with_clone_lock(repo, || {
            fetch_branch(repo, remote, branch)?;
            let commit = rev_parse(repo, &format!("{remote}/{branch}"))?;

            let dir = tempfile::Builder::new()
                .prefix(&format!("pick-train-{}-", sanitize_label(label)))
                .tempdir()?;
            let dir_arg = dir.path().to_string_lossy().into_owned();
            run_git_sync(repo, &["worktree", "add", "--detach", &dir_arg, &commit])?;

            Ok(ScratchWorktree {
                repo: repo.to_path_buf(),
                dir,
                commit,
            })
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The commit checked out in this worktree.
    pub fn commit(&self) -> &str {
        &self.commit
    }
}

impl Drop for ScratchWorktree {
    fn drop(&mut self) {
        let dir_arg = self.dir.path().to_string_lossy().into_owned();
        let removed = with_clone_lock(&self.repo, || {
            run_git_sync(&self.repo, &["worktree", "remove", "--force", &dir_arg])
        });
        if let Err(e) = removed {
            warn!(worktree = %dir_arg, error = %e, "Failed to remove scratch worktree");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScratchRepo;
    use super::*;

    fn worktree_count(repo: &ScratchRepo) -> usize {
        repo.git(&["worktree", "list", "--porcelain"])
            .lines()
            .filter(|l| l.starts_with("worktree "))
            .count()
    }

    #[test]
    fn checks_out_branch_tip_without_moving_the_clone() {
        let repo = ScratchRepo::new();
        let first = repo.commit("first", &[("a.txt", "one\n")]);
        repo.git(&["branch", "release"]);
        let second = repo.commit("second", &[("a.txt", "two\n")]);

        let worktree =
            ScratchWorktree::for_remote_branch(&repo.path(), "origin", "release", "release-abc")
                .unwrap();

        assert_eq!(worktree.commit(), first);
        let content = std::fs::read_to_string(worktree.path().join("a.txt")).unwrap();
        assert_eq!(content, "one\n");
        assert_eq!(repo.git(&["rev-parse", "HEAD"]), second);
        assert_eq!(repo.git(&["symbolic-ref", "--short", "HEAD"]), "main");
    }

    #[test]
    fn drop_removes_the_worktree() {
        let repo = ScratchRepo::new();
        repo.commit("first", &[("a.txt", "one\n")]);

        let worktree =
            ScratchWorktree::for_remote_branch(&repo.path(), "origin", "main", "main").unwrap();
        let dir = worktree.path().to_path_buf();
        assert_eq!(worktree_count(&repo), 2);

        drop(worktree);

        assert!(!dir.exists());
        assert_eq!(worktree_count(&repo), 1);
    }

    #[test]
    fn worktrees_for_different_branches_coexist() {
        let repo = ScratchRepo::new();
        repo.commit("base", &[("a.txt", "one\n")]);
        repo.git(&["branch", "release"]);
        repo.commit("main work", &[("a.txt", "two\n")]);

        let main = ScratchWorktree::for_remote_branch(&repo.path(), "origin", "main", "m").unwrap();
        let release =
            ScratchWorktree::for_remote_branch(&repo.path(), "origin", "release", "r").unwrap();

        let read = |w: &ScratchWorktree| std::fs::read_to_string(w.path().join("a.txt")).unwrap();
        assert_eq!(read(&main), "two\n");
        assert_eq!(read(&release), "one\n");
        assert_eq!(worktree_count(&repo), 3);
    }

    #[test]
    fn missing_branch_leaves_no_worktree() {
        let repo = ScratchRepo::new();
        repo.commit("first", &[("a.txt", "one\n")]);

        let err = ScratchWorktree::for_remote_branch(&repo.path(), "origin", "nope", "nope");

        assert!(err.is_err());
        assert_eq!(worktree_count(&repo), 1);
    }

    #[test]
    fn labels_are_path_safe() {
        assert_eq!(sanitize_label("release/1.0-abc1234"), "release-1.0-abc1234");
        assert_eq!(sanitize_label("a b:c"), "a-b-c");
    }
}
