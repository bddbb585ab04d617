//! Keep an in-memory JSON/YAML value synchronized with its file.
//!
//! Local mutations made through a [`Tracked`] handle are written back after a
//! debounce window; external edits to the file are merged back into the same
//! value after a short grace period.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod value;
pub mod watcher;

pub use codec::{Codec, CodecError, Format};
pub use config::{OptionsOverride, Settings, SyncOptions};
pub use error::{SyncError, SyncResult};
pub use loader::{Loader, configure, load};
pub use value::{SyncEvent, Tracked, merge_in_place};
