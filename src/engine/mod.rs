//! Synchronization engine.
//!
//! One engine task runs per loaded file. Everything that can change the sync
//! state arrives as an [`EngineEvent`] on a single channel, so transitions
//! are applied one at a time even on a multi-threaded runtime:
//!
//! ```text
//! Tracked::update ----> LocalChange  --+
//! FileWatcher ------->  FileChanged  --+--> SyncEngine::run --> SyncMachine
//! timer tasks ------->  *Timer       --+          |
//! write task -------->  WriteDone    --+          +--> encode + write / read + merge
//! ```

mod driver;
mod state;

use serde_json::Value;

pub(crate) use driver::{SyncEngine, content_hash};
pub use state::{Action, SyncMachine, SyncState, Ticket};

/// Inputs to the engine task.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    /// The caller mutated the tracked value.
    LocalChange,
    /// The caller asked for an immediate write.
    FlushRequested,
    /// The file changed on disk.
    FileChanged,
    FlushTimer(Ticket),
    ReloadTimer(Ticket),
    /// The spawned write finished. Carries the content hash on success.
    WriteDone(Result<String, String>),
    /// The last handle was dropped.
    Shutdown { final_value: Value },
}
