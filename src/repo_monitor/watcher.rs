//! Debounced filesystem watcher.
//!
//! Raw notify events are filtered, timestamped and coalesced per path. A path
//! settles once it has seen no further events for the stability threshold,
//! which absorbs editors that truncate-then-append or write several times per
//! save. Native watching is preferred; a polling watcher can take over for
//! filesystems without native events (NFS, WSL mounts, network drives).

use crate::repo_monitor::config::{MonitorConfig, WatchBackend};
use crate::repo_monitor::path_filter::PathFilter;
use notify::{
    event::{AccessKind, AccessMode},
    Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Errors that can occur while setting up a watch.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("cannot watch {path}: {reason}")]
    WatchUnavailable { path: PathBuf, reason: String },
}

impl WatcherError {
    fn unavailable(path: &Path, reason: impl ToString) -> Self {
        WatcherError::WatchUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Simplified event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Map a notify event kind, dropping events that cannot change content.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Added),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            // Close after write marks the end of an in-progress write.
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(ChangeKind::Modified),
            EventKind::Access(_) => None,
            EventKind::Any | EventKind::Other => Some(ChangeKind::Modified),
        }
    }
}

/// One raw observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: Instant,
}

/// A path whose burst of events has gone quiet.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub settled_at: Instant,
}

/// Output of a running watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Settled(SettledChange),
    /// The watch root became unusable after starting. Sent once, nothing
    /// follows it.
    Failed(String),
}

/// Per-path quiet-window bookkeeping.
///
/// Pure data structure: callers pass the clock in, so the settle logic can be
/// tested without a filesystem.
#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, ChangeEvent>,
    stability_threshold: Duration,
}

impl Debouncer {
    pub fn new(stability_threshold: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            stability_threshold,
        }
    }

    /// Record an event, restarting the quiet window for its path.
    ///
    /// Coalescing rules:
    /// - Removed followed by Added = Modified (file was replaced)
    /// - Added followed by Removed = Removed
    /// - otherwise the most recent kind wins
    pub fn register(&mut self, event: ChangeEvent) {
        match self.pending.get_mut(&event.path) {
            Some(existing) => {
                existing.kind = match (existing.kind, event.kind) {
                    (ChangeKind::Removed, ChangeKind::Added) => ChangeKind::Modified,
                    (ChangeKind::Added, ChangeKind::Removed) => ChangeKind::Removed,
                    (_, latest) => latest,
                };
                if event.timestamp > existing.timestamp {
                    existing.timestamp = event.timestamp;
                }
            }
            None => {
                self.pending.insert(event.path.clone(), event);
            }
        }
    }

    /// Remove and return every path that has been quiet long enough, oldest
    /// first.
    pub fn flush_ready(&mut self, now: Instant) -> Vec<SettledChange> {
        let threshold = self.stability_threshold;
        let mut ready = Vec::new();

        self.pending.retain(|_, event| {
            if now.saturating_duration_since(event.timestamp) >= threshold {
                ready.push(event.clone());
                false
            } else {
                true
            }
        });

        ready.sort_by_key(|event| event.timestamp);
        ready
            .into_iter()
            .map(|event| SettledChange {
                path: event.path,
                kind: event.kind,
                settled_at: now,
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop all pending paths without settling them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

type RawEvent = (Instant, notify::Result<Event>);

/// The OS-level event source kept alive for the watcher's lifetime.
enum EventSource {
    Native(RecommendedWatcher),
    Polling(PollWatcher),
}

/// A recursive watch over one root, emitting settled changes.
///
/// Dropping the watcher (or calling [`DebouncedWatcher::stop`]) releases the
/// OS watch and cancels every pending debounce timer.
pub struct DebouncedWatcher {
    root: PathBuf,
    source: Option<EventSource>,
    task: Option<JoinHandle<()>>,
}

impl DebouncedWatcher {
    /// Start watching `root` recursively.
    ///
    /// Must be called from within a Tokio runtime. Returns the watcher and the
    /// receiver of settled events.
    pub fn start(
        root: &Path,
        config: &MonitorConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatcherError> {
        if !root.is_dir() {
            return Err(WatcherError::unavailable(root, "not an existing directory"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatcherError::unavailable(root, e))?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();

        let source = match config.backend {
            WatchBackend::Native => match Self::watch_native(root, raw_tx.clone()) {
                Ok(native) => {
                    tracing::debug!("Using native watcher for {}", root.display());
                    native
                }
                Err(e) if config.polling_fallback => {
                    tracing::warn!(
                        "Native watcher failed for {}: {}, falling back to polling",
                        root.display(),
                        e
                    );
                    Self::watch_polling(root, raw_tx, config.fs_poll_interval())?
                }
                Err(e) => return Err(e),
            },
            WatchBackend::Polling => Self::watch_polling(root, raw_tx, config.fs_poll_interval())?,
        };

        // Anything observed before this point belongs to setting up the watch.
        let armed_at = Instant::now();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        let task = runtime.spawn(debounce_loop(
            root.to_path_buf(),
            PathFilter::scoped(root),
            raw_rx,
            settled_tx,
            armed_at,
            config.stability_threshold(),
            config.poll_interval(),
        ));

        Ok((
            Self {
                root: root.to_path_buf(),
                source: Some(source),
                task: Some(task),
            },
            settled_rx,
        ))
    }

    fn watch_native(
        root: &Path,
        raw_tx: mpsc::UnboundedSender<RawEvent>,
    ) -> Result<EventSource, WatcherError> {
        let mut watcher = RecommendedWatcher::new(forward_to(raw_tx), Config::default())
            .map_err(|e| WatcherError::unavailable(root, e))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::unavailable(root, e))?;
        Ok(EventSource::Native(watcher))
    }

    fn watch_polling(
        root: &Path,
        raw_tx: mpsc::UnboundedSender<RawEvent>,
        interval: Duration,
    ) -> Result<EventSource, WatcherError> {
        tracing::debug!("Using poll watcher for {}", root.display());
        let config = Config::default()
            .with_poll_interval(interval)
            .with_compare_contents(false);
        let mut watcher = PollWatcher::new(forward_to(raw_tx), config)
            .map_err(|e| WatcherError::unavailable(root, e))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::unavailable(root, e))?;
        Ok(EventSource::Polling(watcher))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_using_polling(&self) -> bool {
        matches!(self.source, Some(EventSource::Polling(_)))
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Release the OS watch and cancel pending settles. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.source.take().is_some() {
            tracing::debug!("Stopped watching {}", self.root.display());
        }
    }
}

impl Drop for DebouncedWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward_to(
    raw_tx: mpsc::UnboundedSender<RawEvent>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res| {
        // The receiver is gone once the session stopped; late events are dropped.
        let _ = raw_tx.send((Instant::now(), res));
    }
}

async fn debounce_loop(
    root: PathBuf,
    filter: PathFilter,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    settled_tx: mpsc::UnboundedSender<WatchEvent>,
    armed_at: Instant,
    stability_threshold: Duration,
    poll_interval: Duration,
) {
    let mut debouncer = Debouncer::new(stability_threshold);
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            raw = raw_rx.recv() => {
                let Some((arrived, result)) = raw else {
                    break;
                };
                let event = match result {
                    Ok(event) => event,
                    // Per-entry errors (a file vanishing mid-scan, a new
                    // subdirectory that cannot be watched) leave the root usable.
                    Err(e) if root.is_dir() => {
                        tracing::warn!("Watcher for {} reported: {}", root.display(), e);
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Watcher for {} failed: {}", root.display(), e);
                        let _ = settled_tx.send(WatchEvent::Failed(e.to_string()));
                        break;
                    }
                };
                if arrived < armed_at {
                    continue;
                }
                if matches!(event.kind, EventKind::Remove(_)) && !root.exists() {
                    tracing::error!("Watched directory {} was removed", root.display());
                    let _ = settled_tx.send(WatchEvent::Failed(format!(
                        "watched directory {} was removed",
                        root.display()
                    )));
                    break;
                }
                let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if filter.is_excluded(&path) {
                        tracing::trace!("Ignoring excluded path {}", path.display());
                        continue;
                    }
                    debouncer.register(ChangeEvent {
                        path,
                        kind,
                        timestamp: arrived,
                    });
                }
            }
            _ = ticker.tick() => {
                for settled in debouncer.flush_ready(Instant::now()) {
                    tracing::debug!("Settled {:?}: {}", settled.kind, settled.path.display());
                    if settled_tx.send(WatchEvent::Settled(settled)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn event(path: &str, kind: ChangeKind, timestamp: Instant) -> ChangeEvent {
        ChangeEvent {
            path: PathBuf::from(path),
            kind,
            timestamp,
        }
    }

    #[test]
    fn test_rapid_writes_settle_once() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let t0 = Instant::now();

        for i in 0..5 {
            debouncer.register(event(
                "/repo/a.txt",
                ChangeKind::Modified,
                t0 + Duration::from_millis(i * 10),
            ));
        }
        assert_eq!(debouncer.pending_count(), 1);

        let last = t0 + Duration::from_millis(40);
        assert!(debouncer
            .flush_ready(last + Duration::from_millis(299))
            .is_empty());

        let settled = debouncer.flush_ready(last + Duration::from_millis(300));
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].path, PathBuf::from("/repo/a.txt"));
        assert!(debouncer.is_empty());
        assert!(debouncer.flush_ready(last + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_new_event_restarts_quiet_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        debouncer.register(event("/repo/a.txt", ChangeKind::Modified, t0));
        debouncer.register(event(
            "/repo/a.txt",
            ChangeKind::Modified,
            t0 + Duration::from_millis(90),
        ));

        assert!(debouncer
            .flush_ready(t0 + Duration::from_millis(150))
            .is_empty());
        assert_eq!(
            debouncer.flush_ready(t0 + Duration::from_millis(190)).len(),
            1
        );
    }

    #[test]
    fn test_paths_settle_independently() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        debouncer.register(event("/repo/a.txt", ChangeKind::Modified, t0));
        debouncer.register(event(
            "/repo/b.txt",
            ChangeKind::Added,
            t0 + Duration::from_millis(80),
        ));

        let first = debouncer.flush_ready(t0 + Duration::from_millis(100));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path, PathBuf::from("/repo/a.txt"));

        let second = debouncer.flush_ready(t0 + Duration::from_millis(180));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, ChangeKind::Added);
    }

    #[test]
    fn test_settled_in_arrival_order() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        let t0 = Instant::now();

        debouncer.register(event("/repo/z.txt", ChangeKind::Modified, t0));
        debouncer.register(event(
            "/repo/a.txt",
            ChangeKind::Modified,
            t0 + Duration::from_millis(1),
        ));

        let settled = debouncer.flush_ready(t0 + Duration::from_secs(1));
        let paths: Vec<_> = settled.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/repo/z.txt"), PathBuf::from("/repo/a.txt")]
        );
    }

    #[test]
    fn test_coalesce_remove_then_add() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();

        debouncer.register(event("/repo/a.txt", ChangeKind::Removed, t0));
        debouncer.register(event("/repo/a.txt", ChangeKind::Added, t0));

        let settled = debouncer.flush_ready(t0);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_coalesce_add_then_remove() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();

        debouncer.register(event("/repo/tmp.txt", ChangeKind::Added, t0));
        debouncer.register(event("/repo/tmp.txt", ChangeKind::Modified, t0));
        debouncer.register(event("/repo/tmp.txt", ChangeKind::Removed, t0));

        let settled = debouncer.flush_ready(t0);
        assert_eq!(settled[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_clear_drops_pending() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();
        debouncer.register(event("/repo/a.txt", ChangeKind::Modified, t0));
        debouncer.clear();
        assert!(debouncer.flush_ready(t0).is_empty());
    }

    #[test]
    fn test_access_events_are_ignored() {
        use notify::event::{CreateKind, ModifyKind};

        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Access(AccessKind::Read)),
            None
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Access(AccessKind::Close(
                AccessMode::Write
            ))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Added)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Modified)
        );
    }

    #[tokio::test]
    async fn test_start_on_missing_path_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("nope");

        let result = DebouncedWatcher::start(&missing, &MonitorConfig::default());
        assert!(matches!(
            result,
            Err(WatcherError::WatchUnavailable { .. })
        ));
    }

    #[test]
    fn test_start_outside_runtime_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let result = DebouncedWatcher::start(temp.path(), &MonitorConfig::default());
        assert!(matches!(
            result,
            Err(WatcherError::WatchUnavailable { .. })
        ));
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig::default()
            .with_stability_threshold_ms(150)
            .with_poll_interval_ms(10)
    }

    #[tokio::test]
    async fn test_burst_of_writes_yields_one_settle() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let (_watcher, mut rx) = DebouncedWatcher::start(&root, &fast_config()).unwrap();

        let file = root.join("a.txt");
        for i in 0..5 {
            fs::write(&file, format!("write {i}")).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("settle within timeout")
            .expect("channel open");
        match first {
            WatchEvent::Settled(settled) => assert_eq!(settled.path, file),
            WatchEvent::Failed(e) => panic!("watch failed: {e}"),
        }

        let extra = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(extra.is_err(), "unexpected second settle: {extra:?}");
    }

    #[tokio::test]
    async fn test_pre_existing_files_and_dot_dirs_are_not_reported() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::write(root.join("existing.txt"), "old").unwrap();
        fs::create_dir(root.join(".git")).unwrap();

        let (_watcher, mut rx) = DebouncedWatcher::start(&root, &fast_config()).unwrap();
        fs::write(root.join(".git").join("index"), "binary").unwrap();

        let quiet = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
        assert!(quiet.is_err(), "unexpected event: {quiet:?}");
    }

    #[tokio::test]
    async fn test_polling_backend_settles_new_files_only() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::write(root.join("pre.txt"), "old").unwrap();

        let mut config = fast_config().with_backend(WatchBackend::Polling);
        config.fs_poll_interval_ms = 100;
        let (watcher, mut rx) = DebouncedWatcher::start(&root, &config).unwrap();
        assert!(watcher.is_using_polling());
        assert_eq!(watcher.root(), root.as_path());

        let file = root.join("a.txt");
        fs::write(&file, "new").unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("settle within timeout")
            .expect("channel open");
        match first {
            WatchEvent::Settled(settled) => assert_eq!(settled.path, file),
            WatchEvent::Failed(e) => panic!("watch failed: {e}"),
        }

        let extra = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
        assert!(extra.is_err(), "unexpected second event: {extra:?}");
    }

    /// Drive the debounce loop directly with a hand-fed raw channel.
    fn spawn_loop(
        root: &Path,
    ) -> (
        mpsc::UnboundedSender<RawEvent>,
        mpsc::UnboundedReceiver<WatchEvent>,
        JoinHandle<()>,
    ) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(
            root.to_path_buf(),
            PathFilter::scoped(root),
            raw_rx,
            settled_tx,
            Instant::now(),
            Duration::from_millis(50),
            Duration::from_millis(10),
        ));
        (raw_tx, settled_rx, task)
    }

    fn created(path: PathBuf) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Create(notify::event::CreateKind::File)).add_path(path))
    }

    #[tokio::test]
    async fn test_per_entry_error_keeps_session_alive() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        let (raw_tx, mut rx, task) = spawn_loop(&root);

        raw_tx
            .send((Instant::now(), Err(notify::Error::generic("entry vanished"))))
            .unwrap();
        raw_tx
            .send((Instant::now(), created(root.join("a.txt"))))
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("settle within timeout")
            .expect("channel open");
        match next {
            WatchEvent::Settled(settled) => assert_eq!(settled.path, root.join("a.txt")),
            WatchEvent::Failed(e) => panic!("session ended: {e}"),
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_error_after_root_removed_ends_session() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("repo");
        fs::create_dir(&root).unwrap();
        let (raw_tx, mut rx, _task) = spawn_loop(&root);

        fs::remove_dir(&root).unwrap();
        raw_tx
            .send((Instant::now(), Err(notify::Error::generic("watch lost"))))
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within timeout");
        assert!(matches!(next, Some(WatchEvent::Failed(_))), "{next:?}");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_discards_pending_events() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let config = fast_config().with_stability_threshold_ms(400);
        let (mut watcher, mut rx) = DebouncedWatcher::start(&root, &config).unwrap();

        fs::write(root.join("a.txt"), "pending").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());

        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(next, Ok(None)), "delivered after stop: {next:?}");
    }
}
