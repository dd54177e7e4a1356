//! Core domain types for the pick train bot.
//!
//! Identifiers, the branch chain, and the task/result values that flow
//! between the webhook surface, the workflow, and the pick engine.

pub mod branch;
pub mod ids;
pub mod task;

pub use branch::{BranchChain, InvalidBranchChain};
pub use ids::{
    CommentId, DeliveryId, InstallationId, InvalidRepo, InvalidSha, PrNumber, RepoId, Sha,
};
pub use task::{PickOperation, Task, TaskResult, TaskStatus};
