//! Repository change detection.
//!
//! This module provides:
//! - `path_filter`: Exclusion of dot-prefixed paths
//! - `watcher`: Debounced file watching with native/polling support
//! - `reconciler`: VCS-status-gated change decisions
//! - `bus`: Ordered "repository changed" fan-out
//! - `lifecycle`: Single-session start/stop discipline

pub mod bus;
pub mod config;
pub mod lifecycle;
pub mod path_filter;
pub mod reconciler;
pub mod watcher;

pub use bus::{NotificationBus, RepositoryChanged, Subscription};
pub use config::{MonitorConfig, WatchBackend, MONITOR_SETTINGS_KEY};
pub use lifecycle::{MonitorError, RepoMonitor, WatchSession};
pub use path_filter::{FilterDecision, PathFilter};
pub use reconciler::{ChangeReconciler, ReconcilePolicy, ReconciliationResult};
pub use watcher::{
    ChangeEvent, ChangeKind, DebouncedWatcher, Debouncer, SettledChange, WatchEvent, WatcherError,
};
