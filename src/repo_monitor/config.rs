//! Monitor configuration.
//!
//! All durations are stored in milliseconds so the struct can be read straight
//! from the `monitor` key of the settings file.

use crate::repo_monitor::reconciler::ReconcilePolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Settings key holding [`MonitorConfig`] overrides.
pub const MONITOR_SETTINGS_KEY: &str = "monitor";

/// Which filesystem event source to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// inotify / FSEvents / ReadDirectoryChangesW.
    #[default]
    Native,
    /// Periodic directory scans, for filesystems without native events.
    Polling,
}

/// Tuning for one watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quiet window a path must see before it settles.
    pub stability_threshold_ms: u64,
    /// How often pending paths are checked for settling.
    pub poll_interval_ms: u64,
    pub policy: ReconcilePolicy,
    /// Upper bound on a single status query. `None` waits forever.
    pub status_timeout_ms: Option<u64>,
    pub backend: WatchBackend,
    /// Fall back to polling when the native watcher cannot be set up.
    pub polling_fallback: bool,
    /// Scan interval of the polling backend.
    pub fs_poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stability_threshold_ms: 300,
            poll_interval_ms: 100,
            policy: ReconcilePolicy::default(),
            status_timeout_ms: Some(10_000),
            backend: WatchBackend::default(),
            polling_fallback: true,
            fs_poll_interval_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    /// Read overrides from the `monitor` settings key.
    ///
    /// A missing key yields the defaults; a malformed one is logged and
    /// ignored.
    pub fn from_settings(settings: &Map<String, Value>) -> Self {
        match settings.get(MONITOR_SETTINGS_KEY) {
            None => Self::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid monitor settings: {}", e);
                Self::default()
            }),
        }
    }

    pub fn with_stability_threshold_ms(mut self, ms: u64) -> Self {
        self.stability_threshold_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_status_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.status_timeout_ms = ms;
        self
    }

    pub fn with_backend(mut self, backend: WatchBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make the flush ticker panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn status_timeout(&self) -> Option<Duration> {
        self.status_timeout_ms.map(Duration::from_millis)
    }

    pub fn fs_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fs_poll_interval_ms.max(1))
    }
}
