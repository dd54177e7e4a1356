//! Shared test utilities: an in-memory forge and property-test generators.
//!
//! [`FakeForge`] implements the whole provider contract over a single
//! repository held in memory. Commits snapshot whole file maps, and the merge
//! endpoint performs a file-level three-way merge, so "overlapping edits"
//! and "disjoint edits" behave the way they would on a real forge.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use proptest::prelude::*;
use sha2::{Digest, Sha256};

use crate::provider::{
    Comment, Commit, CommentProvider, CommitProvider, MergeOutcome, MergeProvider, NewCommit,
    Provider, ProviderError, ProviderErrorKind, ProviderKind, ProviderResult, Reference,
    ReferenceProvider, Tree,
};
use crate::types::{BranchChain, CommentId, PrNumber, RepoId, Sha, TaskResult, TaskStatus};

// ─── Generators ───────────────────────────────────────────────────────────────

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(|s| Sha::parse(s).unwrap())
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9/._-]{0,30}".prop_map(String::from)
}

/// A chain of distinct branch names.
pub fn arb_branch_chain() -> impl Strategy<Value = BranchChain> {
    prop::collection::vec(arb_branch_name(), 0..8).prop_map(|names| {
        let mut seen = HashSet::new();
        let unique: Vec<String> = names.into_iter().filter(|n| seen.insert(n.clone())).collect();
        BranchChain::new(unique).unwrap()
    })
}

pub fn arb_task_result() -> impl Strategy<Value = TaskResult> {
    (
        arb_branch_name(),
        prop_oneof![
            Just(TaskStatus::Succeeded),
            Just(TaskStatus::Failed),
            Just(TaskStatus::Pending),
            Just(TaskStatus::Skipped),
        ],
        prop::option::of(".{0,400}"),
    )
        .prop_map(|(branch, status, reason)| TaskResult {
            branch,
            status,
            reason,
        })
}

// ─── Fake forge ───────────────────────────────────────────────────────────────

type Files = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct StoredCommit {
    message: String,
    tree: Sha,
    parents: Vec<Sha>,
}

#[derive(Debug, Default)]
struct ForgeState {
    commits: HashMap<Sha, StoredCommit>,
    trees: HashMap<Sha, Files>,
    refs: BTreeMap<String, Sha>,
    comments: Vec<Comment>,
    next_comment_id: u64,
    patch: Option<String>,
    calls: Vec<String>,
    failures: HashMap<&'static str, ProviderErrorKind>,
    interlopers: HashMap<&'static str, (String, Sha)>,
}

/// An in-memory single-repository forge.
#[derive(Debug)]
pub struct FakeForge {
    kind: ProviderKind,
    state: Mutex<ForgeState>,
}

impl Default for FakeForge {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(parts: &[&str]) -> Sha {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    Sha::new(&hex::encode(hasher.finalize())[..40])
}

fn tree_sha(files: &Files) -> Sha {
    let flat: Vec<String> = files.iter().map(|(p, c)| format!("{p}\n{c}")).collect();
    let mut parts = vec!["tree"];
    parts.extend(flat.iter().map(String::as_str));
    digest(&parts)
}

impl ForgeState {
    fn record(&mut self, call: String) -> ProviderResult<()> {
        let op = call.split_whitespace().next().unwrap_or_default().to_string();
        self.calls.push(call);
        if let Some((branch, sha)) = self.interlopers.remove(op.as_str()) {
            self.refs.insert(format!("refs/heads/{branch}"), sha);
        }
        match self.failures.get(op.as_str()) {
            Some(kind) => Err(ProviderError::new(*kind, format!("injected failure in {op}"))),
            None => Ok(()),
        }
    }

    fn store_commit(&mut self, message: &str, tree: Sha, parents: Vec<Sha>) -> Sha {
        let mut parts = vec!["commit", message, tree.as_str()];
        parts.extend(parents.iter().map(Sha::as_str));
        let sha = digest(&parts);
        self.commits.insert(
            sha.clone(),
            StoredCommit {
                message: message.to_string(),
                tree,
                parents,
            },
        );
        sha
    }

    fn to_commit(&self, sha: &Sha) -> Option<Commit> {
        self.commits.get(sha).map(|c| Commit {
            sha: sha.clone(),
            message: c.message.clone(),
            tree: Tree::from_sha(c.tree.clone()),
            parents: c.parents.clone(),
        })
    }

    fn files_of(&self, sha: &Sha) -> Files {
        self.commits
            .get(sha)
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    /// All ancestors of `sha`, including itself.
    fn ancestors(&self, sha: &Sha) -> HashSet<Sha> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([sha.clone()]);
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone())
                && let Some(commit) = self.commits.get(&next)
            {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn merge_base(&self, a: &Sha, b: &Sha) -> Option<Sha> {
        let of_b = self.ancestors(b);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([a.clone()]);
        while let Some(next) = queue.pop_front() {
            if of_b.contains(&next) {
                return Some(next);
            }
            if seen.insert(next.clone())
                && let Some(commit) = self.commits.get(&next)
            {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        None
    }
}

/// File-level three-way merge. `Err` carries the conflicting paths.
fn three_way(base: &Files, ours: &Files, theirs: &Files) -> Result<Files, Vec<String>> {
    let paths: std::collections::BTreeSet<&String> =
        base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    let mut merged = Files::new();
    let mut conflicts = Vec::new();
    for path in paths {
        let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
        let result = if o == t || b == t {
            o
        } else if b == o {
            t
        } else {
            conflicts.push(path.clone());
            continue;
        };
        if let Some(content) = result {
            merged.insert(path.clone(), content.clone());
        }
    }
    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(conflicts)
    }
}

impl FakeForge {
    pub fn new() -> Self {
        FakeForge {
            kind: ProviderKind::Other("fake".into()),
            state: Mutex::new(ForgeState {
                next_comment_id: 1,
                ..ForgeState::default()
            }),
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ForgeState> {
        self.state.lock().unwrap()
    }

    /// Creates a commit whose files are `parent`'s files with `changes` applied.
    /// A change with content `None` deletes the file.
    pub fn commit(
        &self,
        parent: Option<&Sha>,
        message: &str,
        changes: &[(&str, Option<&str>)],
    ) -> Sha {
        let mut state = self.lock();
        let mut files = parent.map(|p| state.files_of(p)).unwrap_or_default();
        for (path, content) in changes {
            match content {
                Some(c) => files.insert(path.to_string(), c.to_string()),
                None => files.remove(*path),
            };
        }
        let tree = tree_sha(&files);
        state.trees.insert(tree.clone(), files);
        let parents = parent.into_iter().cloned().collect();
        state.store_commit(message, tree, parents)
    }

    /// Points `refs/heads/<branch>` at `sha`.
    pub fn set_branch(&self, branch: &str, sha: &Sha) {
        self.lock()
            .refs
            .insert(format!("refs/heads/{branch}"), sha.clone());
    }

    pub fn branch_tip(&self, branch: &str) -> Option<Sha> {
        self.lock().refs.get(&format!("refs/heads/{branch}")).cloned()
    }

    pub fn ref_names(&self) -> Vec<String> {
        self.lock().refs.keys().cloned().collect()
    }

    pub fn files_at(&self, sha: &Sha) -> BTreeMap<String, String> {
        self.lock().files_of(sha)
    }

    pub fn message_of(&self, sha: &Sha) -> Option<String> {
        self.lock().commits.get(sha).map(|c| c.message.clone())
    }

    pub fn parents_of(&self, sha: &Sha) -> Vec<Sha> {
        self.lock()
            .commits
            .get(sha)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    /// Adds a comment as if a human or an earlier run posted it.
    pub fn add_comment(&self, body: &str) -> CommentId {
        let mut state = self.lock();
        let id = CommentId(state.next_comment_id);
        state.next_comment_id += 1;
        state.comments.push(Comment {
            id,
            body: body.to_string(),
        });
        id
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.lock().comments.clone()
    }

    /// Replaces a comment body as if a human edited it (e.g. ticked a box).
    pub fn edit_comment(&self, id: CommentId, body: &str) {
        let mut state = self.lock();
        if let Some(c) = state.comments.iter_mut().find(|c| c.id == id) {
            c.body = body.to_string();
        }
    }

    pub fn set_patch(&self, patch: &str) {
        self.lock().patch = Some(patch.to_string());
    }

    /// Makes every call of `op` (e.g. `"find_comments"`) fail with `kind`.
    pub fn fail_on(&self, op: &'static str, kind: ProviderErrorKind) {
        self.lock().failures.insert(op, kind);
    }

    /// Moves `branch` to `sha` just before the next call of `op`, simulating
    /// another writer racing ahead.
    pub fn interlope_before(&self, op: &'static str, branch: &str, sha: &Sha) {
        self.lock()
            .interlopers
            .insert(op, (branch.to_string(), sha.clone()));
    }

    /// Every call made so far, as `"<op> <args>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    /// Calls to `op` whose arguments mention `needle`.
    pub fn count_matching(&self, op: &str, needle: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op) && c.contains(needle))
            .count()
    }
}

impl CommitProvider for FakeForge {
    async fn get_commit(&self, _repo: &RepoId, sha: &Sha) -> ProviderResult<Commit> {
        let mut state = self.lock();
        state.record(format!("get_commit {sha}"))?;
        state
            .to_commit(sha)
            .ok_or_else(|| {
                ProviderError::not_found(format!("No commit found for SHA: {sha}")).with_status(404)
            })
    }

    async fn create_commit(&self, _repo: &RepoId, commit: &NewCommit) -> ProviderResult<Commit> {
        let mut state = self.lock();
        state.record(format!("create_commit {}", commit.tree))?;
        if !state.trees.contains_key(&commit.tree) {
            return Err(
                ProviderError::invalid_options(format!("unknown tree {}", commit.tree))
                    .with_status(422),
            );
        }
        if let Some(missing) = commit.parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(
                ProviderError::invalid_options(format!("unknown parent {missing}"))
                    .with_status(422),
            );
        }
        let sha = state.store_commit(&commit.message, commit.tree.clone(), commit.parents.clone());
        state
            .to_commit(&sha)
            .ok_or_else(|| ProviderError::transport("commit vanished"))
    }
}

impl ReferenceProvider for FakeForge {
    async fn get_reference(&self, _repo: &RepoId, name: &str) -> ProviderResult<Reference> {
        let mut state = self.lock();
        state.record(format!("get_reference {name}"))?;
        state
            .refs
            .get(name)
            .map(|sha| Reference {
                name: name.to_string(),
                sha: sha.clone(),
            })
            .ok_or_else(|| ProviderError::not_found(format!("Not Found: {name}")).with_status(404))
    }

    async fn create_reference(
        &self,
        _repo: &RepoId,
        name: &str,
        sha: &Sha,
    ) -> ProviderResult<Reference> {
        let mut state = self.lock();
        state.record(format!("create_reference {name} {sha}"))?;
        if state.refs.contains_key(name) {
            return Err(ProviderError::conflict("Reference already exists").with_status(422));
        }
        state.refs.insert(name.to_string(), sha.clone());
        Ok(Reference {
            name: name.to_string(),
            sha: sha.clone(),
        })
    }

    async fn update_reference(
        &self,
        _repo: &RepoId,
        name: &str,
        sha: &Sha,
        force: bool,
    ) -> ProviderResult<Reference> {
        let mut state = self.lock();
        state.record(format!("update_reference {name} {sha}"))?;
        let current = state
            .refs
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Reference does not exist").with_status(404))?;
        if !force && !state.ancestors(sha).contains(&current) {
            return Err(ProviderError::conflict("Update is not a fast forward").with_status(422));
        }
        state.refs.insert(name.to_string(), sha.clone());
        Ok(Reference {
            name: name.to_string(),
            sha: sha.clone(),
        })
    }

    async fn delete_reference(&self, _repo: &RepoId, name: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.record(format!("delete_reference {name}"))?;
        state
            .refs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found("Reference does not exist").with_status(422))
    }
}

impl CommentProvider for FakeForge {
    async fn find_comments(
        &self,
        _repo: &RepoId,
        merge_request: PrNumber,
    ) -> ProviderResult<Vec<Comment>> {
        let mut state = self.lock();
        state.record(format!("find_comments {merge_request}"))?;
        Ok(state.comments.clone())
    }

    async fn create_comment(
        &self,
        _repo: &RepoId,
        merge_request: PrNumber,
        body: &str,
    ) -> ProviderResult<Comment> {
        let mut state = self.lock();
        state.record(format!("create_comment {merge_request}"))?;
        let id = CommentId(state.next_comment_id);
        state.next_comment_id += 1;
        let comment = Comment {
            id,
            body: body.to_string(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        _repo: &RepoId,
        comment: CommentId,
        body: &str,
    ) -> ProviderResult<Comment> {
        let mut state = self.lock();
        state.record(format!("update_comment {comment}"))?;
        let existing = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or_else(|| ProviderError::not_found("Not Found").with_status(404))?;
        existing.body = body.to_string();
        Ok(existing.clone())
    }
}

impl MergeProvider for FakeForge {
    async fn merge(
        &self,
        _repo: &RepoId,
        base: &str,
        head: &Sha,
        message: &str,
    ) -> ProviderResult<MergeOutcome> {
        let mut state = self.lock();
        state.record(format!("merge {base} {head}"))?;
        let base_ref = format!("refs/heads/{base}");
        let ours = state
            .refs
            .get(&base_ref)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Base does not exist").with_status(404))?;
        if !state.commits.contains_key(head) {
            return Err(ProviderError::not_found("Head does not exist").with_status(404));
        }
        if state.ancestors(&ours).contains(head) {
            return Ok(MergeOutcome::NothingToMerge);
        }

        let ancestor = state
            .merge_base(&ours, head)
            .map(|b| state.files_of(&b))
            .unwrap_or_default();
        let merged = three_way(&ancestor, &state.files_of(&ours), &state.files_of(head))
            .map_err(|paths| {
                ProviderError::conflict(format!("Merge conflict in {}", paths.join(", ")))
                    .with_status(409)
            })?;

        let tree = tree_sha(&merged);
        state.trees.insert(tree.clone(), merged);
        let sha = state.store_commit(message, tree, vec![ours, head.clone()]);
        state.refs.insert(base_ref, sha.clone());
        state
            .to_commit(&sha)
            .map(MergeOutcome::Merged)
            .ok_or_else(|| ProviderError::transport("merge commit vanished"))
    }

    async fn pull_request_patch(
        &self,
        _repo: &RepoId,
        merge_request: PrNumber,
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        state.record(format!("pull_request_patch {merge_request}"))?;
        state
            .patch
            .clone()
            .ok_or_else(|| ProviderError::not_found("Not Found").with_status(404))
    }
}

impl Provider for FakeForge {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::new("o", "r")
    }

    #[tokio::test]
    async fn fake_merge_applies_disjoint_edits() {
        let forge = FakeForge::new();
        let base = forge.commit(None, "base", &[("a.txt", Some("a")), ("b.txt", Some("b"))]);
        let ours = forge.commit(Some(&base), "ours", &[("a.txt", Some("a2"))]);
        let theirs = forge.commit(Some(&base), "theirs", &[("b.txt", Some("b2"))]);
        forge.set_branch("main", &ours);

        let outcome = forge.merge(&repo(), "main", &theirs, "merge").await.unwrap();
        let MergeOutcome::Merged(commit) = outcome else {
            panic!("expected a merge commit");
        };
        let files = forge.files_at(&commit.sha);
        assert_eq!(files["a.txt"], "a2");
        assert_eq!(files["b.txt"], "b2");
    }

    #[tokio::test]
    async fn fake_merge_reports_overlapping_edits() {
        let forge = FakeForge::new();
        let base = forge.commit(None, "base", &[("a.txt", Some("a"))]);
        let ours = forge.commit(Some(&base), "ours", &[("a.txt", Some("ours"))]);
        let theirs = forge.commit(Some(&base), "theirs", &[("a.txt", Some("theirs"))]);
        forge.set_branch("main", &ours);

        let err = forge.merge(&repo(), "main", &theirs, "merge").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.status_code, Some(409));
    }

    #[tokio::test]
    async fn fake_update_rejects_non_fast_forward() {
        let forge = FakeForge::new();
        let base = forge.commit(None, "base", &[("a", Some("1"))]);
        let other = forge.commit(None, "unrelated", &[("a", Some("2"))]);
        forge.set_branch("main", &base);

        let err = forge
            .update_reference(&repo(), "refs/heads/main", &other, false)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        forge
            .update_reference(&repo(), "refs/heads/main", &other, true)
            .await
            .unwrap();
        assert_eq!(forge.branch_tip("main"), Some(other));
    }
}
