//! Workflow state, derived from a merge request's comments.

use crate::provider::Comment;

use super::comment::{is_result, is_summary};

/// Where a merge request is in the pick workflow.
///
/// Derived once per invocation from the comment list; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    /// No summary comment yet.
    NoSummary,
    /// A summary exists; branches may or may not be ticked.
    SummaryPosted { summary: Comment },
    /// A result exists. Terminal: further events are ignored.
    ResultPosted { result: Comment },
}

impl WorkflowState {
    /// Derives the state. The oldest marked comment of each role wins.
    pub fn from_comments(comments: &[Comment]) -> Self {
        if let Some(result) = comments.iter().find(|c| is_result(&c.body)) {
            return WorkflowState::ResultPosted {
                result: result.clone(),
            };
        }
        match comments.iter().find(|c| is_summary(&c.body)) {
            Some(summary) => WorkflowState::SummaryPosted {
                summary: summary.clone(),
            },
            None => WorkflowState::NoSummary,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::NoSummary => "no_summary",
            WorkflowState::SummaryPosted { .. } => "summary_posted",
            WorkflowState::ResultPosted { .. } => "result_posted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommentId, TaskResult};
    use crate::workflow::comment::{ChecklistItem, render_result, render_summary};

    fn comment(id: u64, body: &str) -> Comment {
        Comment {
            id: CommentId(id),
            body: body.to_string(),
        }
    }

    #[test]
    fn no_marked_comments_is_no_summary() {
        let comments = vec![comment(1, "LGTM"), comment(2, "- [x] main")];
        assert_eq!(WorkflowState::from_comments(&comments), WorkflowState::NoSummary);
        assert_eq!(WorkflowState::from_comments(&[]), WorkflowState::NoSummary);
    }

    #[test]
    fn summary_without_result() {
        let summary = comment(2, &render_summary(&[ChecklistItem::unchecked("main")]));
        let comments = vec![comment(1, "hi"), summary.clone()];
        assert_eq!(
            WorkflowState::from_comments(&comments),
            WorkflowState::SummaryPosted { summary }
        );
    }

    #[test]
    fn result_is_terminal_regardless_of_order() {
        let summary = comment(1, &render_summary(&[ChecklistItem::unchecked("main")]));
        let result = comment(2, &render_result(&[TaskResult::succeeded("main")]));

        let state = WorkflowState::from_comments(&[summary.clone(), result.clone()]);
        assert_eq!(state, WorkflowState::ResultPosted { result: result.clone() });
        assert_eq!(state.name(), "result_posted");

        let state = WorkflowState::from_comments(&[result.clone(), summary]);
        assert_eq!(state, WorkflowState::ResultPosted { result });
    }

    #[test]
    fn oldest_summary_wins() {
        let first = comment(1, &render_summary(&[ChecklistItem::unchecked("a")]));
        let second = comment(2, &render_summary(&[ChecklistItem::unchecked("b")]));
        assert_eq!(
            WorkflowState::from_comments(&[first.clone(), second]),
            WorkflowState::SummaryPosted { summary: first }
        );
    }
}
