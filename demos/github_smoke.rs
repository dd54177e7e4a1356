//! Manual smoke test of the GitHub provider against a real repository.
//!
//! # Usage
//!
//! 1. Set `GITHUB_TOKEN` to a token with contents, pull request, and issue
//!    access to the test repository.
//! 2. Set `TEST_REPO` (`owner/repo`) and optionally `TEST_BRANCH` (default
//!    `main`) and `TEST_PR`.
//! 3. Run: `cargo run --example github_smoke`
//!
//! Read-only calls always run. Set `ENABLE_MUTATIONS` to also create and
//! delete a scratch branch and post a comment on `TEST_PR`.

use std::env;

use pick_train::github::{DEFAULT_REQUEST_TIMEOUT, GitHubProvider};
use pick_train::provider::{CommentProvider, CommitProvider, MergeProvider, ReferenceProvider};
use pick_train::types::{PrNumber, RepoId, Sha};

#[derive(Default)]
struct Tally {
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    fn record<T>(&mut self, name: &str, result: anyhow::Result<T>, detail: impl Fn(&T) -> String) {
        match result {
            Ok(value) => {
                println!("  [PASS] {name} {}", detail(&value));
                self.passed += 1;
            }
            Err(e) => {
                println!("  [FAIL] {name}: {e:#}");
                self.failed += 1;
            }
        }
    }

    fn skip(&mut self, name: &str, why: &str) {
        println!("  [SKIP] {name} ({why})");
        self.skipped += 1;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pick_train=debug".into()),
        )
        .init();

    let token = env::var("GITHUB_TOKEN")
        .map_err(|_| anyhow::anyhow!("GITHUB_TOKEN environment variable not set"))?;
    let repo: RepoId = env::var("TEST_REPO")
        .map_err(|_| anyhow::anyhow!("TEST_REPO environment variable not set (e.g. owner/repo)"))?
        .parse()?;
    let branch = env::var("TEST_BRANCH").unwrap_or_else(|_| "main".to_string());
    let test_pr: Option<PrNumber> = env::var("TEST_PR").ok().and_then(|s| s.parse().ok());
    let enable_mutations = env::var("ENABLE_MUTATIONS").is_ok();

    let provider = GitHubProvider::from_token(token, DEFAULT_REQUEST_TIMEOUT)?;
    let mut tally = Tally::default();

    println!("\n=== GitHub Smoke Test ===\n");
    println!("Repository: {repo}");
    println!("Branch:     {branch}\n");

    // ─── Git data ────────────────────────────────────────────────────────────

    println!("--- Git data ---");

    let tip = provider
        .get_reference(&repo, &format!("refs/heads/{branch}"))
        .await
        .map_err(anyhow::Error::from);
    let tip_sha: Option<Sha> = tip.as_ref().ok().map(|r| r.sha.clone());
    tally.record("GetReference", tip, |r| format!("({} at {})", r.name, r.sha.short()));

    match &tip_sha {
        Some(sha) => {
            let commit = provider.get_commit(&repo, sha).await.map_err(anyhow::Error::from);
            tally.record("GetCommit", commit, |c| {
                format!("(tree {}, {} parents)", c.tree.sha.short(), c.parents.len())
            });
        }
        None => tally.skip("GetCommit", "no branch tip"),
    }

    let missing = provider
        .get_reference(&repo, "refs/heads/pick-train/definitely-missing")
        .await;
    let classified = match missing {
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(anyhow::anyhow!("expected not found, got {e}")),
        Ok(r) => Err(anyhow::anyhow!("unexpectedly found {}", r.name)),
    };
    tally.record("MissingReferenceIsNotFound", classified, |_| String::new());

    // ─── Merge request ───────────────────────────────────────────────────────

    println!("\n--- Merge request ---");

    if let Some(pr) = test_pr {
        let comments = provider.find_comments(&repo, pr).await.map_err(anyhow::Error::from);
        tally.record("FindComments", comments, |c| format!("({} comments)", c.len()));

        let patch = provider
            .pull_request_patch(&repo, pr)
            .await
            .map_err(anyhow::Error::from);
        tally.record("PullRequestPatch", patch, |p| format!("({} bytes)", p.len()));
    } else {
        tally.skip("FindComments", "no TEST_PR set");
        tally.skip("PullRequestPatch", "no TEST_PR set");
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    println!("\n--- Mutations ---");

    match (&tip_sha, enable_mutations) {
        (Some(sha), true) => {
            let scratch = format!("refs/heads/pick-train/smoke-{}", sha.short());
            let result = async {
                provider.create_reference(&repo, &scratch, sha).await?;
                let again = provider.create_reference(&repo, &scratch, sha).await;
                provider.delete_reference(&repo, &scratch).await?;
                match again {
                    Err(e) if e.is_conflict() => Ok::<_, anyhow::Error>(()),
                    Err(e) => Err(anyhow::anyhow!("expected conflict on re-create, got {e}")),
                    Ok(_) => Err(anyhow::anyhow!("re-create unexpectedly succeeded")),
                }
            }
            .await;
            tally.record("ScratchReference", result, |_| format!("({scratch})"));
        }
        _ => tally.skip("ScratchReference", "ENABLE_MUTATIONS not set"),
    }

    match (test_pr, enable_mutations) {
        (Some(pr), true) => {
            let result = async {
                let comment = provider
                    .create_comment(&repo, pr, "pick-train smoke test")
                    .await?;
                provider
                    .update_comment(&repo, comment.id, "pick-train smoke test (edited)")
                    .await?;
                Ok::<_, anyhow::Error>(comment.id)
            }
            .await;
            tally.record("CommentRoundTrip", result, |id| format!("(id {id})"));
        }
        _ => tally.skip("CommentRoundTrip", "needs TEST_PR and ENABLE_MUTATIONS"),
    }

    println!("\n=== Summary ===\n");
    println!("Passed:  {}", tally.passed);
    println!("Failed:  {}", tally.failed);
    println!("Skipped: {}", tally.skipped);

    if tally.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
