//! Repository status pane for listening to "repository changed" signals.
//!
//! This module provides `RepoStatusPane` which listens to the monitor's
//! subscription and performs a full status refresh on every signal.

use crate::repo_monitor::Subscription;
use crate::vcs::{RepoStatus, VcsError, VersionControlClient};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Callback type for a completed refresh.
pub type RefreshCallback = Box<dyn Fn(&StatusSummary) + Send + Sync>;

/// Callback type for a failed refresh.
pub type ErrorCallback = Box<dyn Fn(&VcsError) + Send + Sync>;

/// The header line shown above the file list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub branch: Option<String>,
    /// Modified, created, deleted and untracked paths.
    pub changes: usize,
    pub staged: usize,
    pub ahead: u32,
    pub behind: u32,
}

impl From<&RepoStatus> for StatusSummary {
    fn from(status: &RepoStatus) -> Self {
        Self {
            branch: status.current.clone(),
            changes: status.change_count(),
            staged: status.staged_count(),
            ahead: status.ahead,
            behind: status.behind,
        }
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} changes, {} staged", self.changes, self.staged)
    }
}

/// State of the status view.
#[derive(Debug, Clone, Default)]
pub struct StatusViewState {
    /// Last successfully fetched status.
    pub status: Option<RepoStatus>,
    pub summary: Option<StatusSummary>,
    /// Number of completed refreshes.
    pub refresh_count: u64,
    /// Message of the last failed refresh, cleared on success.
    pub last_error: Option<String>,
}

/// A reference to the status view for use in async contexts.
#[derive(Clone, Default)]
pub struct StatusViewHandle {
    state: Arc<RwLock<StatusViewState>>,
    refresh_cb: Option<Arc<RefreshCallback>>,
    error_cb: Option<Arc<ErrorCallback>>,
}

impl StatusViewHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refresh_callback(&mut self, cb: RefreshCallback) {
        self.refresh_cb = Some(Arc::new(cb));
    }

    pub fn set_error_callback(&mut self, cb: ErrorCallback) {
        self.error_cb = Some(Arc::new(cb));
    }

    /// Replace the shown status.
    pub async fn apply_status(&self, status: RepoStatus) {
        let summary = StatusSummary::from(&status);
        {
            let mut state = self.state.write().await;
            state.status = Some(status);
            state.summary = Some(summary.clone());
            state.refresh_count += 1;
            state.last_error = None;
        }

        if let Some(ref cb) = self.refresh_cb {
            cb(&summary);
        }
    }

    /// Record a failed refresh; the previous status stays visible.
    pub async fn apply_error(&self, error: &VcsError) {
        self.state.write().await.last_error = Some(error.to_string());

        if let Some(ref cb) = self.error_cb {
            cb(error);
        }
    }

    pub async fn summary(&self) -> Option<StatusSummary> {
        self.state.read().await.summary.clone()
    }

    pub async fn status(&self) -> Option<RepoStatus> {
        self.state.read().await.status.clone()
    }

    pub async fn refresh_count(&self) -> u64 {
        self.state.read().await.refresh_count
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }
}

/// Status pane component.
///
/// This component:
/// - Listens to "repository changed" signals from the monitor
/// - Re-fetches the full repository status on each one
/// - Notifies the view through its callbacks
pub struct RepoStatusPane {
    view: StatusViewHandle,
    client: Arc<dyn VersionControlClient>,
    listener_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RepoStatusPane {
    pub fn new(client: Arc<dyn VersionControlClient>) -> Self {
        Self {
            view: StatusViewHandle::new(),
            client,
            listener_handle: None,
        }
    }

    pub fn view(&self) -> &StatusViewHandle {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut StatusViewHandle {
        &mut self.view
    }

    /// Fetch and show the current status once.
    pub async fn refresh(&self) {
        Self::refresh_view(&self.view, self.client.as_ref()).await;
    }

    /// Start listening for change signals.
    ///
    /// Replaces any listener already running, e.g. after the monitor switched
    /// repositories and handed out a new subscription.
    pub fn setup_change_listener(&mut self, subscription: Subscription) {
        if let Some(previous) = self.listener_handle.take() {
            previous.abort();
        }

        let view = self.view.clone();
        let client = Arc::clone(&self.client);

        let handle = tokio::spawn(async move {
            Self::listener_loop(view, client, subscription).await;
        });

        self.listener_handle = Some(handle);
    }

    async fn listener_loop(
        view: StatusViewHandle,
        client: Arc<dyn VersionControlClient>,
        mut subscription: Subscription,
    ) {
        while subscription.recv().await.is_some() {
            // One refresh covers every signal queued up behind it.
            let mut skipped = 0;
            while subscription.try_recv().is_ok() {
                skipped += 1;
            }
            tracing::debug!("Repository changed, refreshing status ({} coalesced)", skipped);

            Self::refresh_view(&view, client.as_ref()).await;
        }

        tracing::info!("Repository change stream closed, stopping listener");
    }

    async fn refresh_view(view: &StatusViewHandle, client: &dyn VersionControlClient) {
        match client.status().await {
            Ok(status) => view.apply_status(status).await,
            Err(e) => {
                tracing::warn!("Failed to refresh repository status: {}", e);
                view.apply_error(&e).await;
            }
        }
    }

    /// Stop the listener task.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

/// Builder for RepoStatusPane with callbacks.
pub struct RepoStatusPaneBuilder {
    client: Arc<dyn VersionControlClient>,
    refresh_cb: Option<RefreshCallback>,
    error_cb: Option<ErrorCallback>,
}

impl RepoStatusPaneBuilder {
    pub fn new(client: Arc<dyn VersionControlClient>) -> Self {
        Self {
            client,
            refresh_cb: None,
            error_cb: None,
        }
    }

    pub fn on_refresh(mut self, cb: RefreshCallback) -> Self {
        self.refresh_cb = Some(cb);
        self
    }

    pub fn on_error(mut self, cb: ErrorCallback) -> Self {
        self.error_cb = Some(cb);
        self
    }

    pub fn build(self) -> RepoStatusPane {
        let mut pane = RepoStatusPane::new(self.client);

        if let Some(cb) = self.refresh_cb {
            pane.view_mut().set_refresh_callback(cb);
        }

        if let Some(cb) = self.error_cb {
            pane.view_mut().set_error_callback(cb);
        }

        pane
    }
}
