//! Local git operations for patch-based conflict checks.
//!
//! Only the local-patch conflict strategy touches a working copy. It fetches
//! the target, materializes it in a private detached worktree, and asks
//! `git apply --check` whether a patch would apply. Nothing here writes to a
//! branch or pushes, and the shared clone's own checkout is never moved.
//!
//! All commands run with a clean environment (no system or global config, no
//! terminal prompts) so behavior does not depend on the host's git setup.

pub mod worktree;

use std::path::Path;
use std::process::Output;

use thiserror::Error;

pub use worktree::ScratchWorktree;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// `git apply --check` rejected the patch.
    #[error("patch does not apply: {details}")]
    PatchDoesNotApply { details: String },

    /// IO error (including a missing `git` binary).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Create a git Command with clean environment (no system/user config).
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Run a git command in the given working directory.
///
/// Returns the command output on success, or a GitError on failure.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command and return stdout as a string.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Fetch a branch from `remote`, updating `refs/remotes/<remote>/<branch>`.
pub fn fetch_branch(workdir: &Path, remote: &str, branch: &str) -> GitResult<()> {
    let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
    run_git_sync(workdir, &["fetch", remote, &refspec])?;
    Ok(())
}

/// Resolve a revision to a full commit SHA.
pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<String> {
    run_git_stdout(workdir, &["rev-parse", "--verify", &format!("{rev}^{{commit}}")])
}

/// Check whether `patch` applies cleanly to the checked-out tree.
///
/// Never modifies the working tree or index.
pub fn apply_check(workdir: &Path, patch: &Path) -> GitResult<()> {
    let patch_arg = patch.to_string_lossy();
    let output = git_command(workdir)
        .args(["apply", "--check", patch_arg.as_ref()])
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(GitError::PatchDoesNotApply {
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for building throwaway repositories in tests.

    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A scratch repository whose `origin` remote is itself, so
    /// `refs/remotes/origin/*` can be populated with a plain fetch.
    pub struct ScratchRepo {
        pub dir: TempDir,
    }

    impl ScratchRepo {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path();
            run_git_sync(path, &["init", "-q", "-b", "main"]).unwrap();
            run_git_sync(path, &["config", "user.email", "test@test.com"]).unwrap();
            run_git_sync(path, &["config", "user.name", "Test"]).unwrap();
            run_git_sync(path, &["config", "commit.gpgsign", "false"]).unwrap();
            let origin = path.to_str().unwrap();
            run_git_sync(path, &["remote", "add", "origin", origin]).unwrap();
            ScratchRepo { dir }
        }

        pub fn path(&self) -> PathBuf {
            self.dir.path().to_path_buf()
        }

        /// Writes files and commits them on the current branch.
        pub fn commit(&self, message: &str, files: &[(&str, &str)]) -> String {
            for (name, content) in files {
                std::fs::write(self.dir.path().join(name), content).unwrap();
            }
            run_git_sync(self.dir.path(), &["add", "-A"]).unwrap();
            run_git_sync(self.dir.path(), &["commit", "-q", "-m", message]).unwrap();
            run_git_stdout(self.dir.path(), &["rev-parse", "HEAD"]).unwrap()
        }

        pub fn git(&self, args: &[&str]) -> String {
            run_git_stdout(self.dir.path(), args).unwrap()
        }
    }
}
