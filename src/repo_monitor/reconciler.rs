//! Decides whether a settled filesystem change is worth telling the user about.

use crate::repo_monitor::path_filter::PathFilter;
use crate::vcs::{RepoStatus, VcsError, VersionControlClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What counts as a reportable change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Every settled, filter-passing path is reported without asking the VCS.
    Unfiltered,
    /// Report only when VCS status shows a non-empty change set.
    #[default]
    VcsGated,
}

/// Outcome of reconciling one settled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub has_change: bool,
    /// Status snapshot the decision was based on, if one was queried.
    pub status: Option<RepoStatus>,
}

impl ReconciliationResult {
    fn no_change() -> Self {
        Self {
            has_change: false,
            status: None,
        }
    }
}

/// Confirms settled filesystem changes against VCS status.
///
/// Not meant to be shared between concurrent callers: a session drives one
/// reconciler from a single task, which keeps status queries serialized.
pub struct ChangeReconciler {
    client: Arc<dyn VersionControlClient>,
    filter: PathFilter,
    policy: ReconcilePolicy,
    status_timeout: Option<Duration>,
}

impl ChangeReconciler {
    pub fn new(
        client: Arc<dyn VersionControlClient>,
        filter: PathFilter,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            client,
            filter,
            policy,
            status_timeout: None,
        }
    }

    pub fn with_status_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Reconcile one settled path.
    ///
    /// Never fails: a status error or timeout is logged and read as "no
    /// change".
    pub async fn reconcile(&self, path: &Path) -> ReconciliationResult {
        if self.filter.is_excluded(path) {
            tracing::trace!("Skipping excluded path {}", path.display());
            return ReconciliationResult::no_change();
        }

        match self.policy {
            ReconcilePolicy::Unfiltered => ReconciliationResult {
                has_change: true,
                status: None,
            },
            ReconcilePolicy::VcsGated => match self.query_status().await {
                Ok(status) => {
                    let has_change = status.has_changes();
                    tracing::debug!(
                        "Reconciled {}: has_change={} ({} changes, {} staged)",
                        path.display(),
                        has_change,
                        status.change_count(),
                        status.staged_count()
                    );
                    ReconciliationResult {
                        has_change,
                        status: Some(status),
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Status query via {} failed after change to {}: {}",
                        self.client.backend_name(),
                        path.display(),
                        e
                    );
                    ReconciliationResult::no_change()
                }
            },
        }
    }

    async fn query_status(&self) -> Result<RepoStatus, VcsError> {
        match self.status_timeout {
            Some(limit) => tokio::time::timeout(limit, self.client.status())
                .await
                .map_err(|_| VcsError::Timeout(limit))?,
            None => self.client.status().await,
        }
    }
}
