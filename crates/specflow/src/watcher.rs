//! Filesystem watcher for the workflow root.
//!
//! Watches the whole tree recursively with `notify` and forwards every event
//! that [`classify`] recognizes over a `tokio` channel. Events are forwarded
//! one by one without debouncing; consumers recompute from disk, so a burst
//! of writes converges on the final state.

use crate::classify::{ChangeEvent, ChangeKind, classify};
use crate::error::Result;
use crate::paths::WorkflowPaths;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct WorkflowWatcher;

impl WorkflowWatcher {
    /// Starts watching `paths.workflow_dir()`, creating it if needed.
    ///
    /// Delivery uses `try_send` from the notify thread: when `tx` is full the
    /// event is dropped, logged and counted in [`WatcherHandle::dropped`].
    pub fn start(paths: &WorkflowPaths, tx: mpsc::Sender<ChangeEvent>) -> Result<WatcherHandle> {
        let root = paths.workflow_dir();
        std::fs::create_dir_all(&root)?;
        // Backends report canonical paths, so classify against the canonical root.
        let canonical = root.canonicalize()?;
        let classify_paths = paths.clone().with_workflow_dir(canonical.clone());

        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_in_callback = dropped.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Watch backend error");
                        return;
                    }
                };
                for (path, kind) in changes(&event) {
                    let Some(change) = classify(&classify_paths, &path, kind) else {
                        continue;
                    };
                    debug!(path = %path.display(), kind = ?kind, subsystem = ?change.subsystem, "Classified change");
                    match tx.try_send(change) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            let total = dropped_in_callback.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(path = %path.display(), dropped = total, "Change channel full; event dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
            })?;
        watcher.watch(&canonical, RecursiveMode::Recursive)?;
        debug!(root = %canonical.display(), "Watching workflow root");

        Ok(WatcherHandle {
            _watcher: watcher,
            dropped,
            root: canonical,
        })
    }
}

/// Flattens one backend event into `(path, kind)` pairs.
fn changes(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let all = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };
    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Created),
        EventKind::Remove(_) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let Some(from) = event.paths.first() {
                out.push((from.clone(), ChangeKind::Removed));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((to.clone(), ChangeKind::Created));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Removed
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => all(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Keeps the watch alive; dropping it (or calling [`stop`](Self::stop)) ends it.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    dropped: Arc<AtomicU64>,
    root: PathBuf,
}

impl WatcherHandle {
    /// Events lost to a full channel since the watch started.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Canonical root being watched.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn stop(self) {
        debug!(root = %self.root.display(), "Stopping workflow watcher");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Subsystem;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_changes_maps_kinds() {
        let created = changes(&event(EventKind::Create(CreateKind::File), &["/a"]));
        assert_eq!(created, vec![(PathBuf::from("/a"), ChangeKind::Created)]);

        let modified = changes(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/a"],
        ));
        assert_eq!(modified, vec![(PathBuf::from("/a"), ChangeKind::Modified)]);

        let removed = changes(&event(EventKind::Remove(RemoveKind::Folder), &["/a"]));
        assert_eq!(removed, vec![(PathBuf::from("/a"), ChangeKind::Removed)]);

        let renamed = changes(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/old", "/new"],
        ));
        assert_eq!(
            renamed,
            vec![
                (PathBuf::from("/old"), ChangeKind::Removed),
                (PathBuf::from("/new"), ChangeKind::Created),
            ]
        );

        assert!(changes(&event(EventKind::Any, &["/a"])).is_empty());
    }

    #[tokio::test]
    async fn test_watcher_forwards_task_document_changes() {
        let temp = TempDir::new().unwrap();
        let paths = WorkflowPaths::new(temp.path());
        let spec_dir = paths.specs_dir().join("auth");
        std::fs::create_dir_all(&spec_dir).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let handle = WorkflowWatcher::start(&paths, tx).unwrap();

        std::fs::write(spec_dir.join("tasks.md"), "- [ ] 1. Login\n").unwrap();

        let found = timeout(Duration::from_secs(5), async {
            while let Some(change) = rx.recv().await {
                if change.subsystem == Subsystem::TaskDocument {
                    return Some(change);
                }
            }
            None
        })
        .await
        .expect("timeout")
        .expect("channel closed");

        assert_eq!(found.spec_name.as_deref(), Some("auth"));
        assert_eq!(handle.dropped(), 0);
        handle.stop();
    }

    #[tokio::test]
    async fn test_unrecognized_paths_are_not_forwarded() {
        let temp = TempDir::new().unwrap();
        let paths = WorkflowPaths::new(temp.path());
        let (tx, mut rx) = mpsc::channel(64);
        let handle = WorkflowWatcher::start(&paths, tx).unwrap();

        std::fs::write(paths.workflow_dir().join("scratch.txt"), "x").unwrap();
        assert!(
            timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err()
        );
        handle.stop();
    }
}
