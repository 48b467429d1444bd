//! Git Repository Monitor
//!
//! This crate watches a working copy and tells subscribers when the
//! repository's version-control state has changed, so a status view can
//! refresh without polling.
//!
//! ## Solution Overview
//!
//! ```text
//! Filesystem Change
//!        ↓
//! PathFilter (drops .git, .idea, ... segments)
//!        ↓
//! DebouncedWatcher (one settle per path after 300ms of quiet)
//!        ↓
//! ChangeReconciler [BACKGROUND TASK]
//!        ↓  git status, only when the policy asks for it
//! NotificationBus.emit(RepositoryChanged)
//!        ↓
//! RepoStatusPane.refresh() [SUBSCRIBER]
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use git_repo_monitor::{
//!     app::AppContext,
//!     repo_monitor::MonitorConfig,
//!     settings::{JsonFileStore, Settings},
//!     ui::{RepoStatusPaneBuilder, StatusSummary},
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(Box::new(JsonFileStore::new("settings.json")));
//!     let config = MonitorConfig::from_settings(settings.values());
//!     let mut app = AppContext::new(settings, config)?;
//!
//!     let changes = app.open_repository(Path::new("/path/to/repo")).await?;
//!
//!     let mut pane = RepoStatusPaneBuilder::new(app.client()?)
//!         .on_refresh(Box::new(|summary: &StatusSummary| println!("{summary}")))
//!         .build();
//!     pane.refresh().await;
//!     pane.setup_change_listener(changes);
//!
//!     tokio::signal::ctrl_c().await?;
//!     app.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`repo_monitor`]: Change detection pipeline and session lifecycle
//! - [`vcs`]: Version-control client trait and the `git` CLI backend
//! - [`settings`]: Key-value settings persisted as JSON
//! - [`ui`]: Status pane that refreshes on change signals
//! - [`app`]: Process-wide context and user-invoked operations

#![warn(rustdoc::missing_crate_level_docs)]

pub mod app;
pub mod repo_monitor;
pub mod settings;
pub mod ui;
pub mod vcs;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::app::{AppContext, AppError};
    pub use crate::repo_monitor::{
        ChangeReconciler, DebouncedWatcher, MonitorConfig, MonitorError, NotificationBus,
        PathFilter, ReconcilePolicy, RepoMonitor, RepositoryChanged, Subscription, WatcherError,
    };
    pub use crate::settings::{JsonFileStore, Settings, SettingsStore};
    pub use crate::ui::{RepoStatusPane, RepoStatusPaneBuilder, StatusSummary};
    pub use crate::vcs::{GitCli, RepoStatus, VcsError, VersionControlClient};
}
