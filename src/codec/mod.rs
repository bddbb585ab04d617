//! Format codecs for tracked files.
//!
//! A codec turns file bytes into a [`serde_json::Value`] and back. The codec
//! for a binding is chosen once, from the file extension, when the file is
//! loaded:
//!
//! | Extension       | Codec         |
//! |-----------------|---------------|
//! | `.json`         | [`JsonCodec`] |
//! | `.yaml`, `.yml` | [`YamlCodec`] |
//!
//! Matching is case-insensitive. Anything else is [`CodecError::Unsupported`].

mod json;
mod yaml;

use std::fmt;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::config::SyncOptions;

pub use json::JsonCodec;
pub use yaml::YamlCodec;

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Detect the format from a file extension (without the dot).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("unsupported extension '{extension}'")]
    Unsupported { extension: String },

    #[error("invalid {format} content: {reason}")]
    Decode { format: Format, reason: String },

    #[error("cannot encode as {format}: {reason}")]
    Encode { format: Format, reason: String },
}

/// Decode/encode pair for one file format.
///
/// Encoding is deterministic for a given value: object keys keep their
/// insertion order.
pub trait Codec: Send + Sync {
    fn format(&self) -> Format;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
}

/// Create the codec for `format`, parameterized by the formatting options.
pub fn create_codec(format: Format, options: &SyncOptions) -> Box<dyn Codec> {
    match format {
        Format::Json => Box::new(JsonCodec::new(options.indentation_spaces)),
        Format::Yaml => Box::new(YamlCodec::new(
            options.indentation_spaces,
            options.inline_level,
        )),
    }
}

/// Resolve the codec for a path from its extension.
///
/// Only looks at the path string; the filesystem is not touched.
pub fn for_path(path: &Path, options: &SyncOptions) -> Result<Box<dyn Codec>, CodecError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let format = Format::from_extension(extension).ok_or_else(|| CodecError::Unsupported {
        extension: extension.to_string(),
    })?;

    Ok(create_codec(format, options))
}
