//! Version-control client abstraction.
//!
//! The monitor and the presentation-facing operations talk to the repository
//! only through [`VersionControlClient`]. [`GitCli`] is the implementation
//! backed by the system `git` executable.

pub mod git_cli;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub use git_cli::GitCli;

/// Errors returned by version-control operations.
///
/// The underlying tool reports failures as free text, so most variants only
/// carry a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VcsError {
    #[error("failed to execute git: {0}")]
    Spawn(String),

    #[error("git {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("failed to parse git output: {0}")]
    Parse(String),

    #[error("status query timed out after {0:?}")]
    Timeout(Duration),
}

/// A path that was renamed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedPath {
    pub from: String,
    pub to: String,
}

/// Snapshot of the working tree and index, as reported by the VCS.
///
/// Paths are relative to the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    /// Current branch, `None` when HEAD is detached.
    pub current: Option<String>,
    /// Upstream tracking branch, if configured.
    pub tracking: Option<String>,
    pub modified: Vec<String>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<RenamedPath>,
    /// Untracked paths.
    pub not_added: Vec<String>,
    pub conflicted: Vec<String>,
    /// Paths with changes recorded in the index.
    pub staged: Vec<String>,
    pub ahead: u32,
    pub behind: u32,
}

impl RepoStatus {
    /// Whether any change set a user would care about is non-empty.
    pub fn has_changes(&self) -> bool {
        !(self.modified.is_empty()
            && self.created.is_empty()
            && self.deleted.is_empty()
            && self.not_added.is_empty()
            && self.conflicted.is_empty()
            && self.staged.is_empty())
    }

    /// Number of working-tree changes shown to the user.
    pub fn change_count(&self) -> usize {
        self.modified.len() + self.created.len() + self.deleted.len() + self.not_added.len()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_changes()
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub commit_id: String,
}

/// One entry of the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<FixedOffset>,
    pub message: String,
}

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remote {
    pub name: String,
    pub fetch_url: Option<String>,
    pub push_url: Option<String>,
}

/// Asynchronous access to one repository.
///
/// Implementations are not assumed to be safe for concurrent invocation
/// against the same repository; the monitor serializes its own status queries.
#[async_trait]
pub trait VersionControlClient: Send + Sync {
    /// Current branch, change sets and ahead/behind counts.
    async fn status(&self) -> Result<RepoStatus, VcsError>;

    /// Stage the given paths.
    async fn add(&self, paths: &[String]) -> Result<(), VcsError>;

    /// Unstage the given paths.
    async fn reset(&self, paths: &[String]) -> Result<(), VcsError>;

    async fn commit(&self, message: &str) -> Result<CommitResult, VcsError>;

    /// Unstaged diff of a single path.
    async fn diff(&self, path: &str) -> Result<String, VcsError>;

    /// Most recent commits, newest first.
    async fn log(&self, max_count: usize) -> Result<Vec<CommitSummary>, VcsError>;

    async fn pull(&self) -> Result<(), VcsError>;

    async fn push(&self) -> Result<(), VcsError>;

    async fn remotes(&self) -> Result<Vec<Remote>, VcsError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
