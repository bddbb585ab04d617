//! Show command: decode without tracking.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use confsync::{SyncOptions, codec};

pub fn run(file: &Path, pointer: Option<&str>, options: &SyncOptions) -> Result<()> {
    let codec = codec::for_path(file, options)
        .with_context(|| format!("cannot handle {}", file.display()))?;
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let value = codec
        .decode(&bytes)
        .with_context(|| format!("cannot decode {}", file.display()))?;

    let shown = match pointer {
        Some(pointer) => value
            .pointer(pointer)
            .ok_or_else(|| anyhow!("nothing at {pointer} in {}", file.display()))?,
        None => &value,
    };

    println!("{}", serde_json::to_string_pretty(shown)?);
    Ok(())
}
