//! Pick Train - a bot that cherry-picks merged pull requests down a chain of
//! release branches.
//!
//! A merged change gets a checklist comment naming every downstream branch.
//! Once a maintainer ticks branches and the PR is merged, each selected branch
//! receives the change through the forge's git data API, and a result table is
//! posted back as a comment.

pub mod config;
pub mod conflict;
pub mod executor;
pub mod git;
pub mod github;
pub mod pick;
pub mod provider;
pub mod server;
pub mod types;
pub mod webhooks;
pub mod workflow;

#[cfg(test)]
mod test_utils;
