//! Source providers: where repository trees come from.
//!
//! Providers are synchronous; the indexer runs them on the blocking pool under
//! a timeout.
pub mod git;
pub mod mock;

use std::path::PathBuf;

use thiserror::Error;

pub use git::GitSourceProvider;
pub use mock::MockSourceProvider;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("git not found in PATH")]
    GitNotFound,

    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("ref {git_ref} not found in {repository}")]
    RefNotFound { repository: String, git_ref: String },

    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A checked-out tree and the commit it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub root: PathBuf,
    pub commit: String,
}

pub trait SourceProvider: Send + Sync {
    /// Commit identifier `git_ref` currently resolves to.
    fn current_commit(&self, repository: &str, git_ref: &str) -> Result<String, SourceError>;

    /// Materialize the tree at `git_ref` on local disk.
    fn fetch_tree(&self, repository: &str, git_ref: &str) -> Result<SourceTree, SourceError>;
}
