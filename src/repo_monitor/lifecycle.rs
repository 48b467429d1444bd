//! Watch-session lifecycle.
//!
//! A [`RepoMonitor`] owns at most one [`WatchSession`]. Starting a new session
//! always tears the previous one down first, so switching repositories never
//! leaves two watchers alive or carries subscribers across repositories.

use crate::repo_monitor::bus::{NotificationBus, Subscription};
use crate::repo_monitor::config::MonitorConfig;
use crate::repo_monitor::path_filter::PathFilter;
use crate::repo_monitor::reconciler::ChangeReconciler;
use crate::repo_monitor::watcher::{DebouncedWatcher, WatchEvent, WatcherError};
use crate::vcs::VersionControlClient;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors surfaced by [`RepoMonitor`].
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Watch(#[from] WatcherError),

    #[error("no watch session is running")]
    NotRunning,
}

/// Identifies the session a piece of in-flight work belongs to.
#[derive(Debug, Clone)]
struct SessionToken {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl SessionToken {
    fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

/// One active observation over one root path.
pub struct WatchSession {
    root: PathBuf,
    watcher: DebouncedWatcher,
    bus: NotificationBus,
    reconcile_task: JoinHandle<()>,
    ended: Arc<AtomicBool>,
    generation: u64,
}

impl WatchSession {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the watch broke after starting.
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// Owns start/stop of the single watch session.
pub struct RepoMonitor {
    config: MonitorConfig,
    session: Option<WatchSession>,
    generation: Arc<AtomicU64>,
}

impl RepoMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            session: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start watching `root`, reconciling changes through `client`.
    ///
    /// Any live session is stopped first. Must be called from within a Tokio
    /// runtime.
    pub fn start(
        &mut self,
        root: &Path,
        client: Arc<dyn VersionControlClient>,
    ) -> Result<(), MonitorError> {
        self.stop();

        let root = std::fs::canonicalize(root).map_err(|e| WatcherError::WatchUnavailable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        let (watcher, events) = DebouncedWatcher::start(&root, &self.config)?;

        let token = SessionToken {
            counter: Arc::clone(&self.generation),
            generation: self.generation.load(Ordering::SeqCst),
        };
        let bus = NotificationBus::new();
        let ended = Arc::new(AtomicBool::new(false));
        let reconciler = ChangeReconciler::new(client, PathFilter::scoped(&root), self.config.policy)
            .with_status_timeout(self.config.status_timeout());

        let reconcile_task = tokio::spawn(reconcile_loop(
            reconciler,
            events,
            bus.clone(),
            token.clone(),
            Arc::clone(&ended),
        ));

        tracing::info!(
            "Monitoring {} ({:?} policy{})",
            root.display(),
            self.config.policy,
            if watcher.is_using_polling() { ", polling" } else { "" }
        );

        self.session = Some(WatchSession {
            root,
            watcher,
            bus,
            reconcile_task,
            ended,
            generation: token.generation,
        });
        Ok(())
    }

    /// Tear down the live session, if any. Idempotent.
    ///
    /// Subscribers see end-of-stream; pending settles and reconciliation
    /// results from the old session are discarded.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        // Detach first: an emit racing with this call either completed before
        // it or finds no subscribers.
        session.bus.detach_all();
        self.generation.fetch_add(1, Ordering::SeqCst);
        session.reconcile_task.abort();
        session.watcher.stop();

        tracing::info!("Stopped monitoring {}", session.root.display());
    }

    /// Register for "repository changed" signals of the live session.
    pub fn subscribe(&self) -> Result<Subscription, MonitorError> {
        match &self.session {
            Some(session) if !session.has_ended() => Ok(session.bus.subscribe()),
            _ => Err(MonitorError::NotRunning),
        }
    }

    /// A session exists and its watch is still healthy.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| !session.has_ended())
            .unwrap_or(false)
    }

    /// The live session ended on its own (e.g. its directory was removed).
    pub fn has_ended(&self) -> bool {
        self.session
            .as_ref()
            .map(WatchSession::has_ended)
            .unwrap_or(false)
    }

    pub fn session(&self) -> Option<&WatchSession> {
        self.session.as_ref()
    }

    pub fn root(&self) -> Option<&Path> {
        self.session.as_ref().map(WatchSession::root)
    }

    pub fn is_using_polling(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.watcher.is_using_polling())
            .unwrap_or(false)
    }
}

impl Default for RepoMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl Drop for RepoMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consume settled events one at a time, so status queries for a session
/// never overlap.
async fn reconcile_loop(
    reconciler: ChangeReconciler,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    bus: NotificationBus,
    token: SessionToken,
    ended: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WatchEvent::Settled(change) => {
                let result = reconciler.reconcile(&change.path).await;
                if !token.is_current() {
                    tracing::debug!(
                        "Discarding reconciliation of {} from stopped session",
                        change.path.display()
                    );
                    return;
                }
                if result.has_change {
                    let delivered = bus.emit();
                    tracing::debug!(
                        "Repository changed ({}), notified {} subscribers",
                        change.path.display(),
                        delivered
                    );
                }
            }
            WatchEvent::Failed(reason) => {
                tracing::error!("Watch session ended: {}", reason);
                ended.store(true, Ordering::SeqCst);
                bus.detach_all();
                return;
            }
        }
    }
}
