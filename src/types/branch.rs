//! The ordered release branch chain that defines where picks may go.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from building a [`BranchChain`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBranchChain {
    #[error("branch name at position {0} is empty")]
    EmptyName(usize),

    #[error("branch name {0:?} contains whitespace")]
    Whitespace(String),

    #[error("branch {0:?} appears more than once in the chain")]
    Duplicate(String),
}

/// An ordered sequence of branch names, e.g. `release/1, release/2, master`.
///
/// Order is significant: a change merged into a branch is only ever picked
/// into the branches that come after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct BranchChain(Vec<String>);

impl BranchChain {
    /// Builds a chain, rejecting empty names, names with whitespace, and duplicates.
    pub fn new<I, S>(branches: I) -> Result<Self, InvalidBranchChain>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain: Vec<String> = Vec::new();
        for (idx, branch) in branches.into_iter().enumerate() {
            let branch = branch.into().trim().to_string();
            if branch.is_empty() {
                return Err(InvalidBranchChain::EmptyName(idx));
            }
            if branch.chars().any(char::is_whitespace) {
                return Err(InvalidBranchChain::Whitespace(branch));
            }
            if chain.contains(&branch) {
                return Err(InvalidBranchChain::Duplicate(branch));
            }
            chain.push(branch);
        }
        Ok(BranchChain(chain))
    }

    pub fn branches(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.0.iter().any(|b| b == branch)
    }

    /// Returns the branches strictly after the first occurrence of `source`,
    /// in chain order. Empty when `source` is last or not in the chain.
    pub fn targets_after(&self, source: &str) -> Vec<String> {
        match self.0.iter().position(|b| b == source) {
            Some(idx) => self.0[idx + 1..].to_vec(),
            None => Vec::new(),
        }
    }
}

impl TryFrom<Vec<String>> for BranchChain {
    type Error = InvalidBranchChain;

    fn try_from(branches: Vec<String>) -> Result<Self, Self::Error> {
        BranchChain::new(branches)
    }
}

impl From<BranchChain> for Vec<String> {
    fn from(chain: BranchChain) -> Self {
        chain.0
    }
}
