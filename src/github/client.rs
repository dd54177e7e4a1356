//! Octocrab-backed implementation of the provider contract.
//!
//! `GitHubProvider` is not bound to a repository: every call names the repo it
//! targets, so one authenticated client serves every repository an
//! installation can see. Each request runs under the configured deadline, and
//! nothing is retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::EncodingKey;
use octocrab::Octocrab;
use octocrab::models::{AppId, InstallationId as GitHubInstallationId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{CallKind, classify, timed_out};
use crate::provider::{
    Comment, CommentProvider, Commit, CommitProvider, MergeOutcome, MergeProvider, NewCommit,
    Provider, ProviderError, ProviderFactory, ProviderKind, ProviderResult, Reference,
    ReferenceProvider, Tree,
};
use crate::types::{CommentId, InstallationId, PrNumber, RepoId, Sha};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Provider ─────────────────────────────────────────────────────────────────

/// A GitHub REST client implementing every provider capability.
#[derive(Clone)]
pub struct GitHubProvider {
    client: Octocrab,
    timeout: Duration,
}

impl GitHubProvider {
    pub fn new(client: Octocrab, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Creates a provider authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| classify(e, CallKind::Read, "build client"))?;
        Ok(Self::new(client, timeout))
    }

    async fn call<T, Fut>(&self, kind: CallKind, context: String, fut: Fut) -> ProviderResult<T>
    where
        Fut: Future<Output = Result<T, octocrab::Error>>,
    {
        debug!(call = %context, "github request");
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e, kind, &context)),
            Err(_) => Err(timed_out(&context, self.timeout)),
        }
    }
}

impl std::fmt::Debug for GitHubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubProvider")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

/// `GET /git/commits/{sha}` and `POST /git/commits`.
#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    sha: String,
    message: String,
    tree: ShaOnly,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

impl From<GitCommitResponse> for Commit {
    fn from(raw: GitCommitResponse) -> Self {
        Commit {
            sha: Sha::new(raw.sha),
            message: raw.message,
            tree: Tree::from_sha(Sha::new(raw.tree.sha)),
            parents: raw.parents.into_iter().map(|p| Sha::new(p.sha)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InnerCommit {
    message: String,
    tree: ShaOnly,
}

/// The repository-commit shape returned by `POST /merges`.
#[derive(Debug, Deserialize)]
struct RepoCommitResponse {
    sha: String,
    commit: InnerCommit,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

impl From<RepoCommitResponse> for Commit {
    fn from(raw: RepoCommitResponse) -> Self {
        Commit {
            sha: Sha::new(raw.sha),
            message: raw.commit.message,
            tree: Tree::from_sha(Sha::new(raw.commit.tree.sha)),
            parents: raw.parents.into_iter().map(|p| Sha::new(p.sha)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
    object: ShaOnly,
}

impl From<RefResponse> for Reference {
    fn from(raw: RefResponse) -> Self {
        Reference {
            name: raw.name,
            sha: Sha::new(raw.object.sha),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    name: &'a str,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct UpdateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct MergeRequest<'a> {
    base: &'a str,
    head: &'a str,
    commit_message: &'a str,
}

// ─── Routes ───────────────────────────────────────────────────────────────────

fn repo_route(repo: &RepoId, rest: &str) -> String {
    format!(
        "/repos/{}/{}/{}",
        urlencoding::encode(&repo.owner),
        urlencoding::encode(&repo.repo),
        rest
    )
}

/// Converts `refs/heads/release/1.0` into the `heads/release/1.0` path used by
/// the git refs API, encoding each segment but keeping the separators.
fn ref_path(name: &str) -> String {
    name.strip_prefix("refs/")
        .unwrap_or(name)
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ─── Capabilities ─────────────────────────────────────────────────────────────

impl CommitProvider for GitHubProvider {
    async fn get_commit(&self, repo: &RepoId, sha: &Sha) -> ProviderResult<Commit> {
        let route = repo_route(repo, &format!("git/commits/{}", sha.as_str()));
        let raw: GitCommitResponse = self
            .call(
                CallKind::Read,
                format!("get commit {}", sha.short()),
                self.client.get(&route, None::<&()>),
            )
            .await?;
        Ok(raw.into())
    }

    async fn create_commit(&self, repo: &RepoId, commit: &NewCommit) -> ProviderResult<Commit> {
        let route = repo_route(repo, "git/commits");
        let request = CreateCommitRequest {
            message: &commit.message,
            tree: commit.tree.as_str(),
            parents: commit.parents.iter().map(Sha::as_str).collect(),
        };
        let raw: GitCommitResponse = self
            .call(
                CallKind::Write,
                format!("create commit on tree {}", commit.tree.short()),
                self.client.post(&route, Some(&request)),
            )
            .await?;
        Ok(raw.into())
    }
}

impl ReferenceProvider for GitHubProvider {
    async fn get_reference(&self, repo: &RepoId, name: &str) -> ProviderResult<Reference> {
        let route = repo_route(repo, &format!("git/ref/{}", ref_path(name)));
        let raw: RefResponse = self
            .call(
                CallKind::Read,
                format!("get reference {name}"),
                self.client.get(&route, None::<&()>),
            )
            .await?;
        Ok(raw.into())
    }

    async fn create_reference(
        &self,
        repo: &RepoId,
        name: &str,
        sha: &Sha,
    ) -> ProviderResult<Reference> {
        let route = repo_route(repo, "git/refs");
        let request = CreateRefRequest {
            name,
            sha: sha.as_str(),
        };
        let raw: RefResponse = self
            .call(
                CallKind::RefWrite,
                format!("create reference {name}"),
                self.client.post(&route, Some(&request)),
            )
            .await?;
        Ok(raw.into())
    }

    async fn update_reference(
        &self,
        repo: &RepoId,
        name: &str,
        sha: &Sha,
        force: bool,
    ) -> ProviderResult<Reference> {
        let route = repo_route(repo, &format!("git/refs/{}", ref_path(name)));
        let request = UpdateRefRequest {
            sha: sha.as_str(),
            force,
        };
        let raw: RefResponse = self
            .call(
                CallKind::RefWrite,
                format!("update reference {name}"),
                self.client.patch(&route, Some(&request)),
            )
            .await?;
        Ok(raw.into())
    }

    async fn delete_reference(&self, repo: &RepoId, name: &str) -> ProviderResult<()> {
        let route = repo_route(repo, &format!("git/refs/{}", ref_path(name)));
        self.call(CallKind::RefWrite, format!("delete reference {name}"), async {
            let response = self.client._delete(route, None::<&()>).await?;
            octocrab::map_github_error(response).await?;
            Ok::<_, octocrab::Error>(())
        })
        .await
    }
}

impl CommentProvider for GitHubProvider {
    async fn find_comments(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
    ) -> ProviderResult<Vec<Comment>> {
        let mut page = 1u32;
        let mut all_comments = Vec::new();

        loop {
            let result = self
                .call(
                    CallKind::Read,
                    format!("list comments on {merge_request} (page {page})"),
                    self.client
                        .issues(&repo.owner, &repo.repo)
                        .list_comments(merge_request.0)
                        .per_page(100)
                        .page(page)
                        .send(),
                )
                .await?;

            let items = result.items;
            let is_last_page = items.len() < 100;
            all_comments.extend(items.into_iter().map(|comment| Comment {
                id: CommentId(comment.id.into_inner()),
                body: comment.body.unwrap_or_default(),
            }));

            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all_comments)
    }

    async fn create_comment(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
        body: &str,
    ) -> ProviderResult<Comment> {
        let comment = self
            .call(
                CallKind::Write,
                format!("create comment on {merge_request}"),
                self.client
                    .issues(&repo.owner, &repo.repo)
                    .create_comment(merge_request.0, body),
            )
            .await?;
        Ok(Comment {
            id: CommentId(comment.id.into_inner()),
            body: comment.body.unwrap_or_default(),
        })
    }

    async fn update_comment(
        &self,
        repo: &RepoId,
        comment: CommentId,
        body: &str,
    ) -> ProviderResult<Comment> {
        let route = repo_route(repo, &format!("issues/comments/{}", comment.0));
        let raw: CommentResponse = self
            .call(
                CallKind::Write,
                format!("update comment {}", comment.0),
                self.client
                    .patch(&route, Some(&UpdateCommentRequest { body })),
            )
            .await?;
        Ok(Comment {
            id: CommentId(raw.id),
            body: raw.body.unwrap_or_default(),
        })
    }
}

impl MergeProvider for GitHubProvider {
    async fn merge(
        &self,
        repo: &RepoId,
        base: &str,
        head: &Sha,
        message: &str,
    ) -> ProviderResult<MergeOutcome> {
        let route = repo_route(repo, "merges");
        let request = MergeRequest {
            base,
            head: head.as_str(),
            commit_message: message,
        };
        let context = format!("merge {} into {base}", head.short());

        // 201 carries the merge commit, 204 means the head is already in base.
        let body = self
            .call(CallKind::Merge, context.clone(), async {
                let response = self.client._post(route, Some(&request)).await?;
                let response = octocrab::map_github_error(response).await?;
                if response.status().as_u16() == 204 {
                    return Ok::<_, octocrab::Error>(None);
                }
                self.client.body_to_string(response).await.map(Some)
            })
            .await?;

        match body {
            None => Ok(MergeOutcome::NothingToMerge),
            Some(text) => {
                let raw: RepoCommitResponse = serde_json::from_str(&text).map_err(|e| {
                    ProviderError::transport(format!("{context}: unexpected response: {e}"))
                        .with_source(e)
                })?;
                Ok(MergeOutcome::Merged(raw.into()))
            }
        }
    }

    async fn pull_request_patch(
        &self,
        repo: &RepoId,
        merge_request: PrNumber,
    ) -> ProviderResult<String> {
        self.call(
            CallKind::Read,
            format!("get patch of {merge_request}"),
            self.client
                .pulls(&repo.owner, &repo.repo)
                .get_patch(merge_request.0),
        )
        .await
    }
}

impl Provider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }
}

// ─── Authentication ───────────────────────────────────────────────────────────

/// How the server authenticates to GitHub.
#[derive(Clone)]
pub enum GitHubAuth {
    /// A single token used for every event.
    Token(String),
    /// A GitHub App; each event is served with its installation's token.
    App { app_id: u64, key: EncodingKey },
}

impl std::fmt::Debug for GitHubAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubAuth::Token(_) => f.write_str("Token(<redacted>)"),
            GitHubAuth::App { app_id, .. } => f
                .debug_struct("App")
                .field("app_id", app_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Hands out GitHub providers for webhook events.
#[derive(Debug)]
pub struct GitHubProviderFactory {
    auth: GitHubAuth,
    timeout: Duration,
    /// Built once for token auth, since the token never changes.
    shared: Option<Arc<GitHubProvider>>,
}

impl GitHubProviderFactory {
    pub fn new(auth: GitHubAuth, timeout: Duration) -> ProviderResult<Self> {
        let shared = match &auth {
            GitHubAuth::Token(token) => {
                Some(Arc::new(GitHubProvider::from_token(token.clone(), timeout)?))
            }
            GitHubAuth::App { .. } => None,
        };
        Ok(Self {
            auth,
            timeout,
            shared,
        })
    }

    async fn installation_provider(
        &self,
        app_id: u64,
        key: &EncodingKey,
        installation: InstallationId,
    ) -> ProviderResult<GitHubProvider> {
        let context = format!("authenticate installation {}", installation.0);
        let app = Octocrab::builder()
            .app(AppId(app_id), key.clone())
            .build()
            .map_err(|e| classify(e, CallKind::Read, &context))?;

        let (client, _token) = match tokio::time::timeout(
            self.timeout,
            app.installation_and_token(GitHubInstallationId(installation.0)),
        )
        .await
        {
            Ok(result) => result.map_err(|e| classify(e, CallKind::Read, &context))?,
            Err(_) => return Err(timed_out(&context, self.timeout)),
        };
        Ok(GitHubProvider::new(client, self.timeout))
    }
}

impl ProviderFactory for GitHubProviderFactory {
    type Provider = GitHubProvider;

    async fn for_installation(
        &self,
        installation: Option<InstallationId>,
    ) -> ProviderResult<Arc<GitHubProvider>> {
        match (&self.auth, installation) {
            (GitHubAuth::Token(_), _) => self
                .shared
                .clone()
                .ok_or_else(|| ProviderError::invalid_options("token client was not built")),
            (GitHubAuth::App { app_id, key }, Some(installation)) => Ok(Arc::new(
                self.installation_provider(*app_id, key, installation)
                    .await?,
            )),
            (GitHubAuth::App { .. }, None) => Err(ProviderError::invalid_options(
                "event carries no installation id, and app authentication needs one",
            )),
        }
    }
}
