//! Entry point: load a file and keep it synchronized.
//!
//! ```ignore
//! let load = confsync::configure(Some(OptionsOverride::default().flush_milliseconds(1000)));
//! let settings = load.load("settings.yaml", None).expect("loadable");
//! settings.set("/server/port", json!(8080)); // written back after 1s
//! ```
//!
//! Loading happens synchronously: the codec is resolved from the extension,
//! the file is decoded, and an engine task is spawned on the current tokio
//! runtime together with a file watcher. The caller only ever holds the
//! returned [`Tracked`] handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::codec::{self, Codec};
use crate::config::{OptionsOverride, SyncOptions};
use crate::engine::{EngineEvent, SyncEngine, content_hash};
use crate::error::{SyncError, SyncResult};
use crate::value::{Shared, Tracked, is_container};
use crate::watcher::FileWatcher;

const NOTIFY_CAPACITY: usize = 64;

/// Configured loader (stage one of `configure(options)(path, options)`).
///
/// Each loaded file gets its own resolved options snapshot. Loading a path
/// that is still live through the same loader returns the existing handle.
#[derive(Debug, Default)]
pub struct Loader {
    configured: OptionsOverride,
    /// Canonical path -> live binding.
    bindings: DashMap<PathBuf, Weak<Shared>>,
}

/// Create a loader with options shared by every file it loads.
pub fn configure(options: Option<OptionsOverride>) -> Loader {
    Loader::new(options.unwrap_or_default())
}

/// Load one file with default options.
///
/// Returns `None` on errors, which are logged.
pub fn load(path: impl AsRef<Path>) -> Option<Tracked> {
    Loader::default().load(path, None)
}

impl Loader {
    pub fn new(configured: OptionsOverride) -> Self {
        Self {
            configured,
            bindings: DashMap::new(),
        }
    }

    /// Options a load with `per_call` overrides would use.
    pub fn options_for(&self, per_call: Option<&OptionsOverride>) -> SyncOptions {
        match per_call {
            Some(per_call) => SyncOptions::resolve([per_call, &self.configured]),
            None => SyncOptions::resolve([&self.configured]),
        }
    }

    /// Load `path` and keep it synchronized.
    ///
    /// Returns `None` on errors (unsupported extension, unreadable or
    /// malformed file, no runtime); the error is logged.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        per_call: Option<OptionsOverride>,
    ) -> Option<Tracked> {
        let path = path.as_ref();
        match self.try_load(path, per_call) {
            Ok(tracked) => Some(tracked),
            Err(e) => {
                tracing::error!("[loader] cannot load {}: {e}", path.display());
                None
            }
        }
    }

    /// Like [`Loader::load`] but returns the error.
    pub fn try_load(
        &self,
        path: impl AsRef<Path>,
        per_call: Option<OptionsOverride>,
    ) -> SyncResult<Tracked> {
        let path = path.as_ref();
        let options = self.options_for(per_call.as_ref());

        // Extension check first: unsupported formats never touch the filesystem
        let codec =
            codec::for_path(path, &options).map_err(|e| SyncError::from_codec(path, e))?;

        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let canonical = path.canonicalize().map_err(|e| SyncError::io(path, e))?;

        // The entry stays locked until the binding is registered, so
        // concurrent loads of one path cannot start two engines.
        let tracked = match self.bindings.entry(canonical.clone()) {
            Entry::Occupied(mut entry) => {
                if let Some(shared) = entry.get().upgrade() {
                    crate::debug_event!("loader", "reusing", "{}", canonical.display());
                    return Ok(Tracked { shared });
                }
                let tracked = start_binding(&runtime, canonical.clone(), codec, &options)?;
                entry.insert(Arc::downgrade(&tracked.shared));
                tracked
            }
            Entry::Vacant(entry) => {
                let tracked = start_binding(&runtime, canonical.clone(), codec, &options)?;
                entry.insert(Arc::downgrade(&tracked.shared));
                tracked
            }
        };

        crate::log_event!(
            "loader",
            "tracking",
            "{} (flush {}ms, grace {}ms)",
            canonical.display(),
            options.flush_milliseconds,
            options.double_fire_grace_period
        );

        Ok(tracked)
    }

    /// Number of bindings still alive.
    pub fn live_count(&self) -> usize {
        self.bindings.retain(|_, binding| binding.strong_count() > 0);
        self.bindings.len()
    }

}

/// Read and decode the file, then spawn its watcher and engine.
fn start_binding(
    runtime: &Handle,
    canonical: PathBuf,
    codec: Box<dyn Codec>,
    options: &SyncOptions,
) -> SyncResult<Tracked> {
    let bytes = std::fs::read(&canonical).map_err(|e| SyncError::io(&canonical, e))?;
    let value = codec
        .decode(&bytes)
        .map_err(|e| SyncError::from_codec(&canonical, e))?;
    if !is_container(&value) {
        return Err(SyncError::Decode {
            path: canonical,
            reason: "root is not a mapping or sequence".to_string(),
        });
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);

    let watch_tx = events_tx.clone();
    let watcher = FileWatcher::new(&canonical, move || {
        let _ = watch_tx.send(EngineEvent::FileChanged);
    })?;

    let tracked = Tracked::new(Shared {
        path: canonical.clone(),
        value: RwLock::new(value),
        events: events_tx,
        notifier,
    });

    let engine = SyncEngine::new(
        canonical,
        codec,
        options,
        &tracked.shared,
        events_rx,
        content_hash(&bytes),
    )
    .with_watcher(watcher);
    runtime.spawn(engine.run());

    Ok(tracked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_options_for_layers_per_call_over_configured() {
        let loader = configure(Some(
            OptionsOverride::default()
                .indentation_spaces(2)
                .flush_milliseconds(1000),
        ));

        let options = loader.options_for(None);
        assert_eq!(options.indentation_spaces, 2);
        assert_eq!(options.flush_milliseconds, 1000);

        let per_call = OptionsOverride::default().flush_milliseconds(10);
        let options = loader.options_for(Some(&per_call));
        assert_eq!(options.indentation_spaces, 2);
        assert_eq!(options.flush_milliseconds, 10);
    }

    #[test]
    fn test_unsupported_extension_does_not_touch_filesystem() {
        // Path does not exist; an I/O error would mean we looked at it
        let err = Loader::default()
            .try_load("/definitely/not/here/config.ini", None)
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedFormat { extension, .. } if extension == "ini"));
    }

    #[test]
    fn test_requires_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();

        let err = Loader::default().try_load(&path, None).unwrap_err();
        assert!(matches!(err, SyncError::NoRuntime));
        assert!(Loader::default().load(&path, None).is_none());
    }

    #[tokio::test]
    async fn test_same_path_returns_same_binding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{\"a\": 1}").unwrap();

        let loader = Loader::default();
        let first = loader.load(&path, None).unwrap();
        // Different spelling of the same file
        let second = loader
            .load(temp_dir.path().join(".").join("settings.json"), None)
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(loader.live_count(), 1);
        assert_eq!(second.get("/a"), Some(json!(1)));

        drop(first);
        drop(second);
        assert_eq!(loader.live_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_share_one_binding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{\"a\": 1}").unwrap();

        let loader = Arc::new(Loader::default());
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    loader.load(&path, None)
                })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert!(handles.iter().all(|h| h.ptr_eq(&handles[0])));
        assert_eq!(loader.live_count(), 1);
    }

    #[tokio::test]
    async fn test_scalar_root_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scalar.yaml");
        std::fs::write(&path, "just a string\n").unwrap();

        let err = Loader::default().try_load(&path, None).unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }
}
