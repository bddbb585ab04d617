//! Watch command: track a file and report background activity.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use confsync::{Loader, OptionsOverride, SyncEvent};

pub async fn run(loader: &Loader, file: &Path) -> Result<()> {
    let tracked = loader
        .try_load(file, None::<OptionsOverride>)
        .with_context(|| format!("cannot track {}", file.display()))?;
    let mut events = tracked.subscribe();

    println!("Watching {} (Ctrl-C to stop)", tracked.path().display());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SyncEvent::Reloaded) => {
                    println!("reloaded:");
                    println!("{}", serde_json::to_string_pretty(&tracked.snapshot())?);
                }
                Ok(SyncEvent::ReloadFailed { reason }) => eprintln!("reload failed: {reason}"),
                Ok(SyncEvent::WriteFailed { reason }) => eprintln!("write failed: {reason}"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
