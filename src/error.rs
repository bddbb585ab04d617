//! Error types for loading and synchronizing tracked files.
//!
//! Only [`Loader::try_load`](crate::Loader::try_load) returns these to the
//! caller. Once a binding is live, failures are absorbed by the sync engine
//! and reported through `tracing` and [`SyncEvent`](crate::SyncEvent).

use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unsupported file format for {path}: extension '{extension}'")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("No tokio runtime available to drive the sync engine")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl SyncError {
    /// Attach a path to a codec failure.
    pub(crate) fn from_codec(path: impl Into<PathBuf>, err: CodecError) -> Self {
        let path = path.into();
        match err {
            CodecError::Unsupported { extension } => SyncError::UnsupportedFormat { path, extension },
            CodecError::Decode { reason, .. } => SyncError::Decode { path, reason },
            CodecError::Encode { reason, .. } => SyncError::Encode { path, reason },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
