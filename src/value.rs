//! The tracked value handle.
//!
//! [`Tracked`] wraps the in-memory value of one loaded file. All writes go
//! through it, so every mutation is observable by the sync engine. Clones
//! share the same value; the handle's identity never changes, including
//! across reloads from disk (which merge into the existing value in place).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::engine::EngineEvent;

/// Notifications about background sync activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Local changes were written to disk.
    Flushed,
    /// External file changes were merged into the value.
    Reloaded,
    /// A file notification arrived but the content matched the last sync.
    Unchanged,
    WriteFailed { reason: String },
    ReloadFailed { reason: String },
}

/// State shared between the caller's handles and the engine.
pub(crate) struct Shared {
    pub(crate) path: PathBuf,
    pub(crate) value: RwLock<Value>,
    pub(crate) events: mpsc::UnboundedSender<EngineEvent>,
    pub(crate) notifier: broadcast::Sender<SyncEvent>,
}

impl Shared {
    fn notify_change(&self) {
        // Engine gone means the binding is shutting down
        let _ = self.events.send(EngineEvent::LocalChange);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let final_value = std::mem::take(self.value.get_mut());
        let _ = self.events.send(EngineEvent::Shutdown { final_value });
    }
}

/// Live handle to a file-backed value.
#[derive(Clone)]
pub struct Tracked {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for Tracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("path", &self.shared.path)
            .field("value", &*self.shared.value.read())
            .finish()
    }
}

impl Tracked {
    pub(crate) fn new(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// The canonical path this value is bound to.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Whether both handles refer to the same tracked value.
    pub fn ptr_eq(&self, other: &Tracked) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Read the value under a shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.shared.value.read())
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> Value {
        self.shared.value.read().clone()
    }

    /// Clone of the value at a JSON pointer (`/server/port`).
    pub fn get(&self, pointer: &str) -> Option<Value> {
        self.shared.value.read().pointer(pointer).cloned()
    }

    /// Mutate the value. Always counts as one local change.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let result = {
            let mut guard = self.shared.value.write();
            f(&mut guard)
        };
        self.shared.notify_change();
        result
    }

    /// Set the value at a JSON pointer, creating missing parent objects.
    ///
    /// Returns `false` (and changes nothing) if the pointer is malformed or
    /// runs through a scalar or an out-of-range array index.
    pub fn set(&self, pointer: &str, value: Value) -> bool {
        let applied = {
            let mut guard = self.shared.value.write();
            pointer_set(&mut guard, pointer, value)
        };
        if applied {
            self.shared.notify_change();
        }
        applied
    }

    /// Remove the value at a JSON pointer, returning it.
    pub fn remove(&self, pointer: &str) -> Option<Value> {
        let removed = {
            let mut guard = self.shared.value.write();
            pointer_remove(&mut guard, pointer)
        };
        if removed.is_some() {
            self.shared.notify_change();
        }
        removed
    }

    /// Write immediately instead of waiting for the debounce window.
    pub fn flush_now(&self) {
        let _ = self.shared.events.send(EngineEvent::FlushRequested);
    }

    /// Subscribe to background sync notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.notifier.subscribe()
    }
}

/// Tracked values are mappings or sequences at the root.
pub(crate) fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Merge `source` into `target` without replacing `target`'s container.
///
/// Mappings drop keys missing from `source` and recurse into keys present on
/// both sides; arrays are truncated or extended and recurse element-wise.
/// Anything else, including a container changing kind, is replaced.
pub fn merge_in_place(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(mut source_map)) => {
            target_map.retain(|key, _| source_map.contains_key(key));
            for (key, slot) in target_map.iter_mut() {
                if let Some(incoming) = source_map.shift_remove(key) {
                    merge_in_place(slot, incoming);
                }
            }
            // Keys only present in source, in source order
            for (key, incoming) in source_map {
                target_map.insert(key, incoming);
            }
        }
        (Value::Array(target_items), Value::Array(source_items)) => {
            target_items.truncate(source_items.len());
            let existing = target_items.len();
            for (index, incoming) in source_items.into_iter().enumerate() {
                if index < existing {
                    merge_in_place(&mut target_items[index], incoming);
                } else {
                    target_items.push(incoming);
                }
            }
        }
        (target, source) => *target = source,
    }
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Split a JSON pointer into its parent pointer and last token.
fn split_pointer(pointer: &str) -> Option<(&str, String)> {
    if !pointer.starts_with('/') {
        return None;
    }
    let index = pointer.rfind('/')?;
    Some((&pointer[..index], unescape_token(&pointer[index + 1..])))
}

pub(crate) fn pointer_set(root: &mut Value, pointer: &str, value: Value) -> bool {
    if pointer.is_empty() {
        *root = value;
        return true;
    }
    let Some((parent_pointer, last)) = split_pointer(pointer) else {
        return false;
    };

    // Walk to the parent, creating objects for missing keys
    let mut current = root;
    for token in parent_pointer.split('/').skip(1).map(unescape_token) {
        current = match current {
            Value::Object(map) => map
                .entry(token)
                .or_insert_with(|| Value::Object(Default::default())),
            Value::Array(items) => match token.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(item) => item,
                None => return false,
            },
            _ => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last, value);
            true
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return true;
            }
            match last.parse::<usize>() {
                Ok(i) if i < items.len() => {
                    items[i] = value;
                    true
                }
                Ok(i) if i == items.len() => {
                    items.push(value);
                    true
                }
                _ => false,
            }
        }
        _ => false,
    }
}

pub(crate) fn pointer_remove(root: &mut Value, pointer: &str) -> Option<Value> {
    let (parent_pointer, last) = split_pointer(pointer)?;
    match root.pointer_mut(parent_pointer)? {
        Value::Object(map) => map.shift_remove(&last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}
