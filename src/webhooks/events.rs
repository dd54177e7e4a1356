//! Typed webhook events and how they map onto workflow tasks.

use crate::types::{BranchChain, InstallationId, PrNumber, RepoId, Sha, Task};

/// `pull_request` actions the bot distinguishes. Everything else is dropped
/// by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrAction {
    Opened,
    Reopened,
    Edited,
    Closed,
    /// Sent by forges that report merges as their own action.
    Merged,
}

/// Which workflow phase an event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Summary,
    Execution,
}

/// A parsed `pull_request` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub repo: RepoId,
    pub action: PrAction,
    pub pr_number: PrNumber,
    pub merged: bool,
    pub merge_commit_sha: Option<Sha>,
    /// The branch the pull request was merged into: the pick source.
    pub base_branch: String,
    pub installation: Option<InstallationId>,
}

impl PullRequestEvent {
    /// The phase this event triggers, or `None` if it is not effective.
    pub fn phase(&self) -> Option<Phase> {
        match self.action {
            PrAction::Opened | PrAction::Reopened | PrAction::Edited => Some(Phase::Summary),
            PrAction::Merged => Some(Phase::Execution),
            PrAction::Closed if self.merged => Some(Phase::Execution),
            PrAction::Closed => None,
        }
    }

    /// Builds the task this event asks for.
    pub fn to_task(&self, branches: &BranchChain) -> Option<Task> {
        let task = match self.phase()? {
            Phase::Summary => Task::summary(
                self.repo.clone(),
                branches.clone(),
                &self.base_branch,
                self.pr_number,
            ),
            Phase::Execution => Task::execution(
                self.repo.clone(),
                branches.clone(),
                &self.base_branch,
                self.pr_number,
                self.merge_commit_sha.clone(),
            ),
        };
        Some(match self.installation {
            Some(id) => task.with_installation(id),
            None => task,
        })
    }
}
