//! File watching for tracked files.
//!
//! A [`FileWatcher`] wraps one path and reports content changes to a
//! callback. It holds no policy: debouncing and echo suppression belong to
//! the sync engine.
//!
//! ```text
//! notify::RecommendedWatcher (parent dir, non-recursive)
//!   -> filter: event path == tracked path
//!   -> filter: content change (create, data modify, rename onto path)
//!   -> on_change()
//! ```

mod error;
mod file;

pub use error::WatchError;
pub use file::{FileWatcher, is_content_change};
