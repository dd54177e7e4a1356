//! Shared application state and task submission.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span};

use crate::conflict::ConflictMode;
use crate::executor::{ExecutorError, TaskExecutor};
use crate::provider::ProviderFactory;
use crate::types::{BranchChain, DeliveryId, Task};
use crate::webhooks::WebhookSecret;
use crate::workflow::Workflow;

/// How picks run for every task the server builds.
#[derive(Debug, Clone)]
pub struct PickSettings {
    pub branches: BranchChain,
    /// Local working copy for patch-based conflict checks.
    pub repo_path: Option<PathBuf>,
    pub conflict_mode: Option<ConflictMode>,
}

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
pub struct AppState<F> {
    inner: Arc<AppStateInner<F>>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<F> {
    factory: F,
    webhook_secret: WebhookSecret,
    settings: PickSettings,
    executor: Arc<TaskExecutor>,
}

impl<F: ProviderFactory> AppState<F> {
    pub fn new(
        factory: F,
        webhook_secret: WebhookSecret,
        settings: PickSettings,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                factory,
                webhook_secret,
                settings,
                executor,
            }),
        }
    }

    pub fn webhook_secret(&self) -> &WebhookSecret {
        &self.inner.webhook_secret
    }

    pub fn settings(&self) -> &PickSettings {
        &self.inner.settings
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.inner.executor
    }

    /// Queues `task` on the executor. Returns without waiting for it to run.
    pub fn submit(&self, task: Task, delivery: DeliveryId) -> Result<(), ExecutorError> {
        let task = match &self.inner.settings.repo_path {
            Some(path) => task.with_repo_path(path.clone()),
            None => task,
        };
        let span = info_span!(
            "task",
            delivery = %delivery,
            repo = %task.repo(),
            pr = %task.merge_request()
        );
        let state = self.clone();

        self.inner.executor.push(
            async move {
                let provider = match state
                    .inner
                    .factory
                    .for_installation(task.installation())
                    .await
                {
                    Ok(provider) => provider,
                    Err(e) => {
                        error!(error = %e, "Could not authenticate for installation");
                        return;
                    }
                };
                let workflow = Workflow::new(provider)
                    .with_conflict_mode(state.inner.settings.conflict_mode);
                match workflow.process(&task).await {
                    Ok(outcome) => info!(%outcome, "Task finished"),
                    Err(e) => error!(error = %e, "Task failed"),
                }
            }
            .instrument(span),
        )
    }
}
