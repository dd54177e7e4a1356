use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pick_train::config::{BranchProfile, DEFAULT_PROFILE_PATH, ServerConfig};
use pick_train::conflict::ConflictMode;
use pick_train::executor::TaskExecutor;
use pick_train::github::{DEFAULT_REQUEST_TIMEOUT, GitHubProvider, GitHubProviderFactory};
use pick_train::provider::ProviderKind;
use pick_train::server::{AppState, build_router};
use pick_train::types::{PrNumber, RepoId, Sha, Task};
use pick_train::workflow::{ProcessOutcome, Workflow};

/// Cherry-picks merged pull requests down a chain of release branches.
#[derive(Debug, Parser)]
#[command(name = "pick-train", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve(ServeArgs),
    /// Run one workflow step for a merge request.
    Pick(PickArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// YAML configuration file. `PICK_TRAIN_*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PickArgs {
    /// Forge vendor, e.g. `gh`.
    #[arg(long, default_value = "gh")]
    vendor: String,

    /// Repository as `owner/name`.
    #[arg(long)]
    repo: RepoId,

    /// Personal access token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// The merged commit to pick. Required unless `--is-summary` is set.
    #[arg(long)]
    sha: Option<String>,

    /// The branch the merge request was merged into.
    #[arg(long = "for")]
    source_branch: String,

    #[arg(long)]
    merge_request_id: PrNumber,

    /// Post or refresh the summary checklist instead of picking.
    #[arg(long)]
    is_summary: bool,

    /// Local working copy for patch-based conflict checks.
    #[arg(long, default_value = ".")]
    repo_path: PathBuf,

    /// Branch-chain profile file.
    #[arg(long, default_value = DEFAULT_PROFILE_PATH)]
    profile: PathBuf,

    /// `local-patch` or `remote-merge`; defaults by vendor.
    #[arg(long)]
    conflict_mode: Option<ConflictMode>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pick_train=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Pick(args) => pick(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig::load(args.config.as_deref())?;
    let secret = config.webhook_secret()?;
    let settings = config.pick_settings()?;
    let factory = GitHubProviderFactory::new(config.github_auth()?, config.request_timeout())
        .context("building GitHub client")?;

    let executor = Arc::new(TaskExecutor::start());
    let state = AppState::new(factory, secret, settings, Arc::clone(&executor));
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!(in_flight = executor.in_flight(), "draining picks");
    executor.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn pick(args: PickArgs) -> anyhow::Result<()> {
    let Ok(vendor) = args.vendor.parse::<ProviderKind>();
    if vendor != ProviderKind::GitHub {
        bail!("unsupported vendor {vendor}");
    }
    if args.token.trim().is_empty() {
        bail!("a token is required");
    }

    let branches = BranchProfile::load(&args.profile)?.chain()?;
    let sha = args
        .sha
        .as_deref()
        .map(Sha::parse)
        .transpose()
        .context("--sha")?;

    let task = if args.is_summary {
        Task::summary(args.repo, branches, args.source_branch, args.merge_request_id)
    } else {
        Task::execution(
            args.repo,
            branches,
            args.source_branch,
            args.merge_request_id,
            sha,
        )
    }
    .with_repo_path(args.repo_path);

    let provider = GitHubProvider::from_token(args.token, DEFAULT_REQUEST_TIMEOUT)?;

    let outcome = Workflow::new(Arc::new(provider))
        .with_conflict_mode(args.conflict_mode)
        .process(&task)
        .await?;

    println!("{outcome}");
    if let ProcessOutcome::Picked(results) = &outcome {
        for result in results {
            match &result.reason {
                Some(reason) => {
                    println!("  {}: {} ({reason})", result.branch, result.status.label())
                }
                None => println!("  {}: {}", result.branch, result.status.label()),
            }
        }
    }
    Ok(())
}
