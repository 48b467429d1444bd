//! Scripted in-memory client for tests.

use super::{CommitResult, CommitSummary, Remote, RepoStatus, VcsError, VersionControlClient};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) struct FakeVcs {
    status: Mutex<Result<RepoStatus, VcsError>>,
    delay: Option<Duration>,
    status_calls: AtomicUsize,
    ops: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn with_status(status: RepoStatus) -> Self {
        Self {
            status: Mutex::new(Ok(status)),
            delay: None,
            status_calls: AtomicUsize::new(0),
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn clean() -> Self {
        Self::with_status(RepoStatus {
            current: Some("main".to_string()),
            ..Default::default()
        })
    }

    pub fn modified(paths: &[&str]) -> Self {
        Self::with_status(RepoStatus {
            current: Some("main".to_string()),
            modified: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn failing(err: VcsError) -> Self {
        let fake = Self::clean();
        *fake.status.lock().unwrap() = Err(err);
        fake
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_status(&self, status: Result<RepoStatus, VcsError>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl VersionControlClient for FakeVcs {
    async fn status(&self) -> Result<RepoStatus, VcsError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.status.lock().unwrap().clone()
    }

    async fn add(&self, paths: &[String]) -> Result<(), VcsError> {
        self.record(format!("add {}", paths.join(" ")));
        Ok(())
    }

    async fn reset(&self, paths: &[String]) -> Result<(), VcsError> {
        self.record(format!("reset {}", paths.join(" ")));
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<CommitResult, VcsError> {
        self.record(format!("commit {message}"));
        Ok(CommitResult {
            commit_id: "0123456789abcdef0123456789abcdef01234567".to_string(),
        })
    }

    async fn diff(&self, path: &str) -> Result<String, VcsError> {
        self.record(format!("diff {path}"));
        Ok(format!("diff --git a/{path} b/{path}\n"))
    }

    async fn log(&self, max_count: usize) -> Result<Vec<CommitSummary>, VcsError> {
        self.record(format!("log {max_count}"));
        Ok(Vec::new())
    }

    async fn pull(&self) -> Result<(), VcsError> {
        self.record("pull".to_string());
        Ok(())
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.record("push".to_string());
        Ok(())
    }

    async fn remotes(&self) -> Result<Vec<Remote>, VcsError> {
        self.record("remotes".to_string());
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}
