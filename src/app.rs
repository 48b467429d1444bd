//! Process-wide context: settings, the monitor and the open repository.
//!
//! At most one [`AppContext`] is alive at a time. Creating a second one fails
//! with [`AppError::AlreadyRunning`] until the first is dropped.

use crate::repo_monitor::{MonitorConfig, MonitorError, RepoMonitor, Subscription};
use crate::settings::Settings;
use crate::vcs::{
    CommitResult, CommitSummary, GitCli, Remote, RepoStatus, VcsError, VersionControlClient,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Number of commits returned by [`AppContext::recent_commits`].
pub const RECENT_COMMIT_COUNT: usize = 10;

static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);

/// Builds the client for a repository root.
pub type ClientFactory = Box<dyn Fn(&Path) -> Arc<dyn VersionControlClient> + Send + Sync>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("another application context is already running")]
    AlreadyRunning,

    #[error("no repository is open")]
    NoRepository,

    #[error("{} is not a repository: {reason}", path.display())]
    NotARepository { path: PathBuf, reason: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

struct OpenRepository {
    root: PathBuf,
    client: Arc<dyn VersionControlClient>,
}

/// The lifecycle-owned process context.
pub struct AppContext {
    settings: Settings,
    monitor: RepoMonitor,
    factory: ClientFactory,
    repository: Option<OpenRepository>,
    initial_repository: Option<PathBuf>,
}

impl AppContext {
    /// Create the context with the `git` executable as backend.
    pub fn new(settings: Settings, config: MonitorConfig) -> Result<Self, AppError> {
        Self::with_factory(
            settings,
            config,
            Box::new(|root: &Path| Arc::new(GitCli::new(root)) as Arc<dyn VersionControlClient>),
        )
    }

    pub fn with_factory(
        settings: Settings,
        config: MonitorConfig,
        factory: ClientFactory,
    ) -> Result<Self, AppError> {
        if CONTEXT_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::AlreadyRunning);
        }

        let initial_repository = settings.repository();
        if let Some(ref path) = initial_repository {
            tracing::debug!("Persisted repository: {}", path.display());
        }

        Ok(Self {
            settings,
            monitor: RepoMonitor::new(config),
            factory,
            repository: None,
            initial_repository,
        })
    }

    /// The persisted repository path, handed out at most once.
    ///
    /// The presentation layer decides whether to open it.
    pub fn take_initial_repository(&mut self) -> Option<PathBuf> {
        self.initial_repository.take()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn monitor(&self) -> &RepoMonitor {
        &self.monitor
    }

    /// Root of the open repository.
    pub fn repository(&self) -> Option<&Path> {
        self.repository.as_ref().map(|repo| repo.root.as_path())
    }

    /// Open (or switch to) the repository at `path`.
    ///
    /// The path must answer a status query. On success the previous session is
    /// torn down, monitoring starts on the new root and the path is persisted.
    /// Returns a subscription to the new session's change signals.
    pub async fn open_repository(&mut self, path: &Path) -> Result<Subscription, AppError> {
        let root = std::fs::canonicalize(path)
            .ok()
            .filter(|root| root.is_dir())
            .ok_or_else(|| AppError::NotARepository {
                path: path.to_path_buf(),
                reason: "not a directory".to_string(),
            })?;

        let client = (self.factory)(&root);
        if let Err(e) = client.status().await {
            return Err(AppError::NotARepository {
                path: root,
                reason: e.to_string(),
            });
        }

        self.repository = None;
        self.monitor.start(&root, Arc::clone(&client))?;
        let subscription = self.monitor.subscribe()?;

        self.settings.set_repository(&root);
        tracing::info!("Opened repository {}", root.display());
        self.repository = Some(OpenRepository { root, client });

        Ok(subscription)
    }

    /// Another subscription to the open repository's change signals.
    pub fn subscribe(&self) -> Result<Subscription, AppError> {
        self.client()?;
        Ok(self.monitor.subscribe()?)
    }

    /// The client of the open repository.
    pub fn client(&self) -> Result<Arc<dyn VersionControlClient>, AppError> {
        self.repository
            .as_ref()
            .map(|repo| Arc::clone(&repo.client))
            .ok_or(AppError::NoRepository)
    }

    pub async fn status(&self) -> Result<RepoStatus, AppError> {
        Ok(self.client()?.status().await?)
    }

    pub async fn stage_files(&self, paths: &[String]) -> Result<(), AppError> {
        Ok(self.client()?.add(paths).await?)
    }

    pub async fn unstage_files(&self, paths: &[String]) -> Result<(), AppError> {
        Ok(self.client()?.reset(paths).await?)
    }

    pub async fn commit_changes(&self, message: &str) -> Result<CommitResult, AppError> {
        Ok(self.client()?.commit(message).await?)
    }

    pub async fn file_diff(&self, path: &str) -> Result<String, AppError> {
        Ok(self.client()?.diff(path).await?)
    }

    pub async fn recent_commits(&self) -> Result<Vec<CommitSummary>, AppError> {
        Ok(self.client()?.log(RECENT_COMMIT_COUNT).await?)
    }

    pub async fn remotes(&self) -> Result<Vec<Remote>, AppError> {
        Ok(self.client()?.remotes().await?)
    }

    /// Pull, then push. A failed pull skips the push.
    pub async fn sync(&self) -> Result<(), AppError> {
        let client = self.client()?;
        client.pull().await?;
        client.push().await?;
        Ok(())
    }

    /// Stop monitoring and forget the open repository.
    pub fn shutdown(&mut self) {
        self.monitor.stop();
        self.repository = None;
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
        CONTEXT_LIVE.store(false, Ordering::SeqCst);
    }
}
