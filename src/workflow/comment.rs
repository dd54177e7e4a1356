//! Summary and result comment bodies.
//!
//! The two comment roles are told apart only by an invisible HTML marker at the
//! end of the body. Both markers must match byte for byte, since comments
//! posted by earlier runs are the workflow's only durable state.
//!
//! The summary is a markdown checklist a human ticks:
//!
//! ```text
//! Will be cherry-picked to the following branches:
//!
//! - [ ] release/2
//! - [x] main
//!
//! <!-- ...summary flag... -->
//! ```
//!
//! The result is a table with one row per branch attempted.

use crate::types::TaskResult;

/// Marker that identifies the summary (checklist) comment.
pub const SUMMARY_MARKER: &str =
    "<!-- Do not edit or delete , This is a cherry-pick summary flag. | o((>ω< ))o -->";

/// Marker that identifies the result comment.
pub const RESULT_MARKER: &str =
    "<!-- Do not edit or delete , This is a cherry-pick result flag. | o((>ω< ))o -->";

const SUMMARY_HEADER: &str = "Will be cherry-picked to the following branches:";

const RESULT_HEADER: &str = "Pick Result: ";

const CHECKED: &str = "- [x] ";

const UNCHECKED: &str = "- [ ] ";

/// Maximum size of a reason cell, in bytes.
pub const MAX_REASON_LEN: usize = 300;

const HTTP_VERBS: [&str; 5] = ["GET", "POST", "PATCH", "PUT", "DELETE"];

pub fn is_summary(body: &str) -> bool {
    body.contains(SUMMARY_MARKER)
}

pub fn is_result(body: &str) -> bool {
    body.contains(RESULT_MARKER)
}

// ─── Summary ──────────────────────────────────────────────────────────────────

/// One checklist line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub branch: String,
    pub checked: bool,
}

impl ChecklistItem {
    pub fn unchecked(branch: impl Into<String>) -> Self {
        ChecklistItem {
            branch: branch.into(),
            checked: false,
        }
    }
}

/// Renders the summary body.
pub fn render_summary(items: &[ChecklistItem]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            let box_ = if item.checked { CHECKED } else { UNCHECKED };
            format!("{box_}{}", item.branch)
        })
        .collect();
    format!(
        "{SUMMARY_HEADER}\n\n{}\n\n{SUMMARY_MARKER}",
        lines.join("\n")
    )
}

/// Parses one checklist line. A branch name must not contain whitespace.
fn parse_item(line: &str) -> Option<ChecklistItem> {
    let line = line.trim_end_matches('\r');
    let (checked, rest) = if let Some(idx) = line.find(CHECKED) {
        (true, &line[idx + CHECKED.len()..])
    } else if let Some(idx) = line.find(UNCHECKED) {
        (false, &line[idx + UNCHECKED.len()..])
    } else {
        return None;
    };
    let branch = rest.trim();
    if branch.is_empty() || branch.contains(char::is_whitespace) {
        return None;
    }
    Some(ChecklistItem {
        branch: branch.to_string(),
        checked,
    })
}

/// Every checklist line in document order, deduplicated by first occurrence.
pub fn parse_checklist(body: &str) -> Vec<ChecklistItem> {
    let mut items: Vec<ChecklistItem> = Vec::new();
    for item in body.lines().filter_map(parse_item) {
        if !items.iter().any(|seen| seen.branch == item.branch) {
            items.push(item);
        }
    }
    items
}

/// Branches listed in the checklist, checked or not.
pub fn parse_listed_branches(body: &str) -> Vec<String> {
    parse_checklist(body)
        .into_iter()
        .map(|item| item.branch)
        .collect()
}

/// Branches a human ticked, in document order.
pub fn parse_selected_branches(body: &str) -> Vec<String> {
    parse_checklist(body)
        .into_iter()
        .filter(|item| item.checked)
        .map(|item| item.branch)
        .collect()
}

// ─── Result ───────────────────────────────────────────────────────────────────

/// Renders the result body. Output depends only on `results`.
pub fn render_result(results: &[TaskResult]) -> String {
    let mut body = String::from(RESULT_HEADER);
    body.push('\n');
    body.push_str("| Branch | Status | Reason |\n");
    body.push_str("| --- | --- | --- |\n");
    for result in results {
        let reason = result
            .reason
            .as_deref()
            .map(normalize_reason)
            .unwrap_or_default();
        body.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&result.branch),
            result.status,
            reason
        ));
    }
    body.push('\n');
    body.push_str(RESULT_MARKER);
    body
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Turns an error message into a single table cell a non-engineer can read.
///
/// Request URLs (with their HTTP verb) are dropped, whitespace collapses to
/// single spaces, pipes are escaped and the result is capped at
/// [`MAX_REASON_LEN`] bytes.
pub fn normalize_reason(reason: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for token in reason.split_whitespace() {
        if token.starts_with("http://") || token.starts_with("https://") {
            if kept.last().is_some_and(|prev| HTTP_VERBS.contains(prev)) {
                kept.pop();
            }
            continue;
        }
        kept.push(token);
    }
    truncate_with_suffix(&escape_cell(&kept.join(" ")), MAX_REASON_LEN)
}

/// Truncates a string to the given length with a "... [truncated]" suffix.
fn truncate_with_suffix(s: &str, max_len: usize) -> String {
    const SUFFIX: &str = "... [truncated]";

    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len.saturating_sub(SUFFIX.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    // An escaped pipe must not lose its backslash's partner.
    if s[..end].ends_with('\\') && !s[..end].ends_with("\\\\") {
        end -= 1;
    }

    format!("{}{}", &s[..end], SUFFIX)
}
