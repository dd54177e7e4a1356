//! The comment-driven workflow.
//!
//! A merge request moves through three states, read back from its comments on
//! every invocation ([`WorkflowState`]):
//!
//! ```text
//! NoSummary ──(summary task)──▶ SummaryPosted ──(execution task)──▶ ResultPosted
//! ```
//!
//! The summary phase posts (or refreshes) a checklist of eligible branches.
//! The execution phase picks the change into every ticked branch, in checklist
//! order, and posts one result comment. Once a result exists the merge request
//! is done and every later event is a no-op, which makes duplicate webhook
//! deliveries harmless.

pub mod comment;
pub mod state;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::conflict::{ConflictMode, ConflictStrategy};
use crate::pick::{PickOutcome, perform_pick};
use crate::provider::{CommentProvider, Provider, ProviderError};
use crate::types::{PickOperation, Sha, Task, TaskResult, TaskStatus};

use comment::{
    ChecklistItem, parse_listed_branches, parse_selected_branches, render_result, render_summary,
};
pub use comment::{RESULT_MARKER, SUMMARY_MARKER};
pub use state::WorkflowState;

/// Errors that stop a workflow step before any branch is attempted.
///
/// Failures of individual picks are never returned here; they become
/// [`TaskStatus::Failed`] rows in the result comment.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The task is malformed.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Reading or writing comments failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// What a workflow step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new summary comment was posted.
    SummaryPosted,
    /// The existing summary was rewritten for a changed target set.
    SummaryUpdated,
    /// The existing summary already lists the right branches.
    SummaryUnchanged,
    /// The source branch has no downstream branches.
    NoTargets,
    /// Picks ran and a result comment was posted.
    Picked(Vec<TaskResult>),
    /// A result comment already exists.
    AlreadyCompleted,
    /// Execution was requested but no summary was ever posted.
    NoSummary,
    /// The summary exists but no branch is ticked.
    NothingSelected,
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::SummaryPosted => f.write_str("summary posted"),
            ProcessOutcome::SummaryUpdated => f.write_str("summary updated"),
            ProcessOutcome::SummaryUnchanged => f.write_str("summary unchanged"),
            ProcessOutcome::NoTargets => f.write_str("no target branches"),
            ProcessOutcome::Picked(results) => {
                let ok = results
                    .iter()
                    .filter(|r| r.status == TaskStatus::Succeeded)
                    .count();
                write!(f, "picked {ok}/{} branches", results.len())
            }
            ProcessOutcome::AlreadyCompleted => f.write_str("already completed"),
            ProcessOutcome::NoSummary => f.write_str("no summary comment"),
            ProcessOutcome::NothingSelected => f.write_str("no branch selected"),
        }
    }
}

/// Runs workflow steps against one forge.
#[derive(Debug)]
pub struct Workflow<P> {
    provider: Arc<P>,
    conflict_mode: Option<ConflictMode>,
}

impl<P> Clone for Workflow<P> {
    fn clone(&self) -> Self {
        Workflow {
            provider: Arc::clone(&self.provider),
            conflict_mode: self.conflict_mode,
        }
    }
}

impl<P: Provider> Workflow<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Workflow {
            provider,
            conflict_mode: None,
        }
    }

    /// Overrides the forge's default conflict detection strategy.
    pub fn with_conflict_mode(mut self, mode: Option<ConflictMode>) -> Self {
        self.conflict_mode = mode;
        self
    }

    /// Runs the step `task` asks for.
    #[instrument(
        skip_all,
        fields(repo = %task.repo(), pr = %task.merge_request(), summary = task.is_summary())
    )]
    pub async fn process(&self, task: &Task) -> Result<ProcessOutcome, WorkflowError> {
        let outcome = if task.is_summary() {
            self.create_summary(task).await?
        } else {
            self.perform_picks(task).await?
        };
        info!(%outcome, "Workflow step finished");
        Ok(outcome)
    }

    /// Posts the checklist, or brings an existing one up to date.
    pub async fn create_summary(&self, task: &Task) -> Result<ProcessOutcome, WorkflowError> {
        let targets = task.target_branches();
        if targets.is_empty() {
            info!(source = task.source_branch(), "No downstream branches");
            return Ok(ProcessOutcome::NoTargets);
        }

        let comments = self
            .provider
            .find_comments(task.repo(), task.merge_request())
            .await?;

        let state = WorkflowState::from_comments(&comments);
        debug!(state = state.name(), "Observed workflow state");

        match state {
            WorkflowState::ResultPosted { .. } => Ok(ProcessOutcome::AlreadyCompleted),
            WorkflowState::NoSummary => {
                let items: Vec<ChecklistItem> =
                    targets.iter().map(ChecklistItem::unchecked).collect();
                self.provider
                    .create_comment(task.repo(), task.merge_request(), &render_summary(&items))
                    .await?;
                Ok(ProcessOutcome::SummaryPosted)
            }
            WorkflowState::SummaryPosted { summary } => {
                let listed = parse_listed_branches(&summary.body);
                if listed == targets {
                    return Ok(ProcessOutcome::SummaryUnchanged);
                }

                let checked = parse_selected_branches(&summary.body);
                let items: Vec<ChecklistItem> = targets
                    .iter()
                    .map(|branch| ChecklistItem {
                        branch: branch.clone(),
                        checked: checked.contains(branch),
                    })
                    .collect();
                info!(comment = %summary.id, ?listed, ?targets, "Target branches changed");
                self.provider
                    .update_comment(task.repo(), summary.id, &render_summary(&items))
                    .await?;
                Ok(ProcessOutcome::SummaryUpdated)
            }
        }
    }

    /// Picks the change into every ticked branch and posts the result.
    pub async fn perform_picks(&self, task: &Task) -> Result<ProcessOutcome, WorkflowError> {
        let sha = task.commit_sha().ok_or_else(|| {
            WorkflowError::InvalidOptions("a commit SHA is required to perform picks".into())
        })?;

        let comments = self
            .provider
            .find_comments(task.repo(), task.merge_request())
            .await?;

        let state = WorkflowState::from_comments(&comments);
        debug!(state = state.name(), "Observed workflow state");

        let summary = match state {
            WorkflowState::ResultPosted { result } => {
                info!(comment = %result.id, "Result already posted");
                return Ok(ProcessOutcome::AlreadyCompleted);
            }
            WorkflowState::NoSummary => {
                warn!("No summary comment to act on");
                return Ok(ProcessOutcome::NoSummary);
            }
            WorkflowState::SummaryPosted { summary } => summary,
        };

        let selected = parse_selected_branches(&summary.body);
        if selected.is_empty() {
            info!("No branch selected");
            return Ok(ProcessOutcome::NothingSelected);
        }

        let strategy = ConflictStrategy::resolve(
            &self.provider.kind(),
            self.conflict_mode,
            task.repo_path().map(|p| p.to_path_buf()),
            task.merge_request(),
        );

        let mut results = Vec::with_capacity(selected.len());
        for branch in selected {
            results.push(self.pick_one(task, sha, &branch, &strategy).await);
        }

        self.provider
            .create_comment(task.repo(), task.merge_request(), &render_result(&results))
            .await?;
        Ok(ProcessOutcome::Picked(results))
    }

    async fn pick_one(
        &self,
        task: &Task,
        sha: &Sha,
        branch: &str,
        strategy: &ConflictStrategy,
    ) -> TaskResult {
        if branch == task.source_branch() {
            return TaskResult::skipped(branch, "source branch");
        }
        if !task.branches().contains(branch) {
            return TaskResult::skipped(branch, "not in the branch chain");
        }

        let op = PickOperation::new(task.repo().clone(), branch, sha.clone());
        match perform_pick(self.provider.as_ref(), &op, strategy).await {
            Ok(PickOutcome::Picked { .. }) => TaskResult::succeeded(branch),
            Ok(PickOutcome::AlreadyApplied) => {
                TaskResult::succeeded(branch).with_reason("already picked")
            }
            Err(e) => {
                warn!(branch, error = %e, conflict = e.is_conflict(), "Pick failed");
                TaskResult::failed(branch, e.to_string())
            }
        }
    }
}
