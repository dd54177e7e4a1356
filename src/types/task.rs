//! Units of work flowing through the workflow.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::branch::BranchChain;
use super::ids::{InstallationId, PrNumber, RepoId, Sha};

/// A unit of intent built from one inbound event or CLI invocation.
///
/// Tasks are immutable once built and consumed once by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    repo: RepoId,
    branches: BranchChain,
    source_branch: String,
    commit_sha: Option<Sha>,
    merge_request: PrNumber,
    is_summary: bool,
    repo_path: Option<PathBuf>,
    installation: Option<InstallationId>,
}

impl Task {
    /// A summary-phase task: post or refresh the checklist comment.
    pub fn summary(
        repo: RepoId,
        branches: BranchChain,
        source_branch: impl Into<String>,
        merge_request: PrNumber,
    ) -> Self {
        Task {
            repo,
            branches,
            source_branch: source_branch.into(),
            commit_sha: None,
            merge_request,
            is_summary: true,
            repo_path: None,
            installation: None,
        }
    }

    /// An execution-phase task: pick `commit_sha` into the checked branches.
    pub fn execution(
        repo: RepoId,
        branches: BranchChain,
        source_branch: impl Into<String>,
        merge_request: PrNumber,
        commit_sha: Option<Sha>,
    ) -> Self {
        Task {
            commit_sha,
            is_summary: false,
            ..Task::summary(repo, branches, source_branch, merge_request)
        }
    }

    /// Sets the local working copy used for patch-based conflict checks.
    pub fn with_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.repo_path = Some(path.into());
        self
    }

    /// Records the GitHub App installation the event came from.
    pub fn with_installation(mut self, installation: InstallationId) -> Self {
        self.installation = Some(installation);
        self
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn branches(&self) -> &BranchChain {
        &self.branches
    }

    pub fn source_branch(&self) -> &str {
        &self.source_branch
    }

    pub fn commit_sha(&self) -> Option<&Sha> {
        self.commit_sha.as_ref()
    }

    pub fn merge_request(&self) -> PrNumber {
        self.merge_request
    }

    pub fn is_summary(&self) -> bool {
        self.is_summary
    }

    pub fn repo_path(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }

    pub fn installation(&self) -> Option<InstallationId> {
        self.installation
    }

    /// Branches eligible as pick targets: the chain suffix after the source branch.
    pub fn target_branches(&self) -> Vec<String> {
        self.branches.targets_after(&self.source_branch)
    }
}

/// Outcome of one branch attempt, as shown in the result comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Pending,
    Skipped,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::Pending => "Pending",
            TaskStatus::Skipped => "Skipped",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded => "✅",
            TaskStatus::Failed => "❌",
            TaskStatus::Pending => "⏳",
            TaskStatus::Skipped => "⏭️",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.emoji(), self.label())
    }
}

/// Per-branch result aggregated into the result comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub branch: String,
    pub status: TaskStatus,
    pub reason: Option<String>,
}

impl TaskResult {
    pub fn succeeded(branch: impl Into<String>) -> Self {
        TaskResult {
            branch: branch.into(),
            status: TaskStatus::Succeeded,
            reason: None,
        }
    }

    pub fn failed(branch: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskResult {
            branch: branch.into(),
            status: TaskStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(branch: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskResult {
            branch: branch.into(),
            status: TaskStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One "move this commit onto that branch" request for the pick engine.
///
/// Recomputed from the task and the selected branches on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOperation {
    pub repo: RepoId,
    pub target: String,
    pub sha: Sha,
}

impl PickOperation {
    pub fn new(repo: RepoId, target: impl Into<String>, sha: Sha) -> Self {
        PickOperation {
            repo,
            target: target.into(),
            sha,
        }
    }

    /// The fully qualified reference of the target branch.
    pub fn target_ref(&self) -> String {
        format!("refs/heads/{}", self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> BranchChain {
        BranchChain::new(["r1", "r2", "master"]).unwrap()
    }

    #[test]
    fn summary_task_targets_follow_source() {
        let task = Task::summary(RepoId::new("o", "r"), chain(), "r1", PrNumber(7));
        assert!(task.is_summary());
        assert_eq!(task.commit_sha(), None);
        assert_eq!(task.target_branches(), vec!["r2", "master"]);
    }

    #[test]
    fn execution_task_carries_sha_and_context() {
        let sha = Sha::new("a".repeat(40));
        let task = Task::execution(
            RepoId::new("o", "r"),
            chain(),
            "r2",
            PrNumber(7),
            Some(sha.clone()),
        )
        .with_repo_path("/tmp/checkout")
        .with_installation(InstallationId(99));

        assert!(!task.is_summary());
        assert_eq!(task.commit_sha(), Some(&sha));
        assert_eq!(task.repo_path(), Some(Path::new("/tmp/checkout")));
        assert_eq!(task.installation(), Some(InstallationId(99)));
        assert_eq!(task.target_branches(), vec!["master"]);
    }

    #[test]
    fn status_display_has_emoji_and_label() {
        assert_eq!(TaskStatus::Succeeded.to_string(), "✅ Succeeded");
        assert_eq!(TaskStatus::Failed.to_string(), "❌ Failed");
        assert_eq!(TaskStatus::Pending.to_string(), "⏳ Pending");
        assert_eq!(TaskStatus::Skipped.to_string(), "⏭️ Skipped");
    }

    #[test]
    fn pick_operation_target_ref() {
        let op = PickOperation::new(RepoId::new("o", "r"), "release/1", Sha::new("a".repeat(40)));
        assert_eq!(op.target_ref(), "refs/heads/release/1");
    }
}
