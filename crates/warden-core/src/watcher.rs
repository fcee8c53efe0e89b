//! Debounced change notifications for a staging directory
//!
//! [`ChangeWatcher::start`] subscribes to recursive notifications under a
//! root and calls back once per quiet subtree. The notification thread only
//! forwards events into a channel; debouncing and callbacks run on a thread
//! owned by the returned [`WatchHandle`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, trace, warn};

/// Longest wait between checks when nothing is pending
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// The part of the staging tree that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeHint {
    pub root: PathBuf,
    /// First path component below the root, or `None` for the root itself
    pub subtree: Option<String>,
}

impl ScopeHint {
    /// Directory the hint points at.
    pub fn path(&self) -> PathBuf {
        match &self.subtree {
            Some(name) => self.root.join(name),
            None => self.root.clone(),
        }
    }
}

enum Message {
    Changed(Vec<PathBuf>),
    Stop,
}

/// Starts [`WatchHandle`]s.
pub struct ChangeWatcher;

impl ChangeWatcher {
    /// Watch `root` and call `on_batch` after `debounce` passes without
    /// further events in the same subtree.
    ///
    /// When the platform cannot deliver notifications the failure is logged
    /// and an inactive handle is returned; manual syncs keep working.
    pub fn start<F>(root: &Path, debounce: Duration, on_batch: F) -> WatchHandle
    where
        F: Fn(ScopeHint) + Send + 'static,
    {
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let (tx, rx) = mpsc::channel();

        let events = tx.clone();
        let subscribed = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                let _ = events.send(Message::Changed(event.paths));
            }
            Err(e) => error!("File watcher error: {}", e),
        })
        .and_then(|mut watcher| {
            watcher.watch(&root, RecursiveMode::Recursive)?;
            Ok(watcher)
        });

        let watcher = match subscribed {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Change notifications unavailable, auto-sync disabled");
                return WatchHandle::inactive(root);
            }
        };

        let worker_root = root.clone();
        let worker = thread::Builder::new()
            .name("warden-watcher".into())
            .spawn(move || debounce_loop(&worker_root, debounce, rx, on_batch));
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, "Could not start watcher thread, auto-sync disabled");
                return WatchHandle::inactive(root);
            }
        };

        info!(root = %root.display(), debounce_ms = debounce.as_millis() as u64, "Watching for changes");
        WatchHandle {
            root,
            watcher: Some(watcher),
            stop: Some(tx),
            worker: Some(worker),
        }
    }
}

/// Owned subscription. Dropping it stops the watcher.
pub struct WatchHandle {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    stop: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    fn inactive(root: PathBuf) -> Self {
        Self {
            root,
            watcher: None,
            stop: None,
            worker: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether notifications are being delivered.
    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Unsubscribe, cancel pending debounces and wait for a callback that
    /// is already running. Safe to call more than once.
    pub fn stop(&mut self) {
        drop(self.watcher.take());
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(Message::Stop);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(root = %self.root.display(), "Watcher thread panicked");
            }
            info!(root = %self.root.display(), "Stopped watching");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn debounce_loop<F>(root: &Path, debounce: Duration, rx: Receiver<Message>, on_batch: F)
where
    F: Fn(ScopeHint),
{
    let mut pending: HashMap<Option<String>, Instant> = HashMap::new();

    loop {
        let wait = pending
            .values()
            .map(|last| (*last + debounce).saturating_duration_since(Instant::now()))
            .min()
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(Message::Changed(paths)) => {
                let now = Instant::now();
                for path in paths {
                    let subtree = subtree_of(root, &path);
                    trace!(path = %path.display(), subtree = ?subtree, "change event");
                    pending.insert(subtree, now);
                }
            }
            Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => {
                if !pending.is_empty() {
                    debug!(cancelled = pending.len(), "dropping pending batches on stop");
                }
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        let ready: Vec<Option<String>> = pending
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= debounce)
            .map(|(subtree, _)| subtree.clone())
            .collect();
        for subtree in ready {
            pending.remove(&subtree);
            debug!(subtree = ?subtree, "change batch settled");
            on_batch(ScopeHint {
                root: root.to_path_buf(),
                subtree,
            });
        }
    }
}

/// Subtree an event path belongs to. Files directly in the root, and paths
/// outside it, map to the root itself.
fn subtree_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = rel.components();
    let first = components.next()?.as_os_str().to_string_lossy().into_owned();
    if components.next().is_some() || path.is_dir() {
        Some(first)
    } else {
        None
    }
}
