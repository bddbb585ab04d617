//! Single-file watcher built on `notify`.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::error::WatchError;

/// Watches one file and calls back on content changes.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by replacing the file keep being observed.
pub struct FileWatcher {
    path: PathBuf,
    /// The underlying watcher (kept alive by storing it).
    _watcher: notify::RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `path`. The path should be canonical, as event paths
    /// are compared against it literally.
    pub fn new<F>(path: &Path, on_change: F) -> Result<Self, WatchError>
    where
        F: Fn() + Send + 'static,
    {
        let target = path.to_path_buf();
        let filter_target = target.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if is_content_change(&event.kind)
                        && event.paths.iter().any(|p| p == &filter_target)
                    {
                        on_change();
                    }
                }
                Err(e) => {
                    tracing::error!("[watcher] file watch error: {e}");
                }
            }
        })?;

        let dir = watch_dir(&target);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        crate::debug_event!("watcher", "watching", "{}", target.display());

        Ok(Self {
            path: target,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory to register with the OS watcher.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether an event kind can mean the file's content changed.
///
/// Metadata-only changes, accesses and removals are not content changes.
pub fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_content_change_filter() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::To
        ))));

        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::From
        ))));
        assert!(!is_content_change(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_watch_dir() {
        assert_eq!(
            watch_dir(Path::new("/etc/app/settings.json")),
            PathBuf::from("/etc/app")
        );
        assert_eq!(watch_dir(Path::new("settings.json")), PathBuf::from("."));
    }

    #[test]
    fn test_reports_changes_to_tracked_file_only() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().canonicalize().unwrap();
        let tracked = dir.join("settings.json");
        let sibling = dir.join("other.json");
        std::fs::write(&tracked, "{}").unwrap();
        std::fs::write(&sibling, "{}").unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let watcher = FileWatcher::new(&tracked, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(watcher.path(), tracked.as_path());

        std::fs::write(&sibling, "{\"x\": 1}").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        std::fs::write(&tracked, "{\"x\": 1}").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }
}
