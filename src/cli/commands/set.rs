//! Set command: one local change, flushed through the engine.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use confsync::{Loader, OptionsOverride, SyncEvent};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse the value argument: JSON if it parses, otherwise a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn run(loader: &Loader, file: &Path, pointer: &str, raw: &str) -> Result<()> {
    let tracked = loader
        .try_load(file, None::<OptionsOverride>)
        .with_context(|| format!("cannot track {}", file.display()))?;
    let mut events = tracked.subscribe();

    if !tracked.set(pointer, parse_value(raw)) {
        bail!("cannot set {pointer} in {}", file.display());
    }
    tracked.flush_now();

    let outcome = tokio::time::timeout(FLUSH_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Flushed) => return Ok(()),
                Ok(SyncEvent::WriteFailed { reason }) => return Err(anyhow!(reason)),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(anyhow!("sync engine stopped")),
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for write"))?;

    outcome.with_context(|| format!("cannot write {}", file.display()))?;
    println!("{pointer} = {}", tracked.get(pointer).unwrap_or(Value::Null));
    Ok(())
}
