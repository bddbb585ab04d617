//! Async driver that executes state machine actions.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc};

use crate::codec::Codec;
use crate::config::SyncOptions;
use crate::value::{Shared, SyncEvent, is_container, merge_in_place};
use crate::watcher::FileWatcher;

use super::EngineEvent;
use super::state::{Action, SyncMachine, SyncState};

/// SHA-256 of file content, hex encoded.
pub(crate) fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Drives one binding: path + codec + tracked value.
pub(crate) struct SyncEngine {
    path: PathBuf,
    codec: Box<dyn Codec>,
    machine: SyncMachine,
    /// Weak so that dropping the last `Tracked` handle shuts the engine down.
    shared: Weak<Shared>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    notifier: broadcast::Sender<SyncEvent>,
    /// Hash of the content last written or read.
    last_hash: Option<String>,
    write_in_flight: bool,
    /// A due write was skipped because the value was being dropped.
    flush_on_shutdown: bool,
    watcher: Option<FileWatcher>,
}

impl SyncEngine {
    pub(crate) fn new(
        path: PathBuf,
        codec: Box<dyn Codec>,
        options: &SyncOptions,
        shared: &Arc<Shared>,
        events_rx: mpsc::UnboundedReceiver<EngineEvent>,
        initial_hash: String,
    ) -> Self {
        Self {
            path,
            codec,
            machine: SyncMachine::new(options.flush_window(), options.grace_period()),
            shared: Arc::downgrade(shared),
            events_tx: shared.events.clone(),
            events_rx,
            notifier: shared.notifier.clone(),
            last_hash: Some(initial_hash),
            write_in_flight: false,
            flush_on_shutdown: false,
            watcher: None,
        }
    }

    /// Attach the file watcher; it lives as long as the engine.
    pub(crate) fn with_watcher(mut self, watcher: FileWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Process events until the tracked value is dropped.
    pub(crate) async fn run(mut self) {
        crate::debug_event!(
            "sync",
            "started",
            "{} ({})",
            self.path.display(),
            self.codec.format()
        );

        while let Some(event) = self.events_rx.recv().await {
            match event {
                EngineEvent::LocalChange => {
                    let action = self.machine.on_local_change();
                    if matches!(self.machine.state(), SyncState::Reloading { .. }) {
                        crate::debug_event!("sync", "deferred", "local change during reload");
                    }
                    self.perform(action).await;
                }
                EngineEvent::FlushRequested => {
                    let action = self.machine.on_flush_requested();
                    self.perform(action).await;
                }
                EngineEvent::FileChanged => {
                    let action = self.machine.on_file_change();
                    if action == Action::None {
                        crate::debug_event!(
                            "sync",
                            "ignored",
                            "file change while {:?}",
                            self.machine.state()
                        );
                    }
                    self.perform(action).await;
                }
                EngineEvent::FlushTimer(ticket) => {
                    let action = self.machine.on_flush_timer(ticket);
                    self.perform(action).await;
                }
                EngineEvent::ReloadTimer(ticket) => {
                    let action = self.machine.on_reload_timer(ticket);
                    self.perform(action).await;
                }
                EngineEvent::WriteDone(result) => {
                    let action = self.finish_write(result);
                    self.perform(action).await;
                }
                EngineEvent::Shutdown { final_value } => {
                    self.shutdown(final_value).await;
                    break;
                }
            }
        }

        crate::debug_event!("sync", "stopped", "{}", self.path.display());
    }

    async fn perform(&mut self, mut action: Action) {
        loop {
            action = match action {
                Action::None => return,
                Action::StartFlushTimer { ticket, delay } => {
                    self.start_timer(delay, EngineEvent::FlushTimer(ticket));
                    return;
                }
                Action::StartReloadTimer { ticket, delay } => {
                    self.start_timer(delay, EngineEvent::ReloadTimer(ticket));
                    return;
                }
                Action::Write => {
                    self.start_write();
                    return;
                }
                Action::Reload => {
                    if self.reload().await {
                        self.machine.on_reload_applied();
                        return;
                    }
                    // Unwritten edits are still only in memory
                    self.machine.on_reload_skipped()
                }
            };
        }
    }

    fn start_timer(&self, delay: Duration, event: EngineEvent) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    /// Encode the current value and write it on a separate task.
    fn start_write(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            // Value is being dropped; the shutdown event carries it
            self.flush_on_shutdown = true;
            self.machine.on_write_complete();
            return;
        };
        let snapshot = shared.value.read().clone();
        drop(shared);

        let bytes = match self.codec.encode(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = self.events_tx.send(EngineEvent::WriteDone(Err(e.to_string())));
                self.write_in_flight = true;
                return;
            }
        };

        let hash = content_hash(&bytes);
        let path = self.path.clone();
        let tx = self.events_tx.clone();
        self.write_in_flight = true;

        tokio::spawn(async move {
            let result = tokio::fs::write(&path, &bytes)
                .await
                .map(|_| hash)
                .map_err(|e| e.to_string());
            let _ = tx.send(EngineEvent::WriteDone(result));
        });
    }

    fn finish_write(&mut self, result: Result<String, String>) -> Action {
        self.write_in_flight = false;
        match result {
            Ok(hash) => {
                self.last_hash = Some(hash);
                crate::log_event!("sync", "flushed", "{}", self.path.display());
                self.notify(SyncEvent::Flushed);
            }
            Err(reason) => {
                tracing::error!(
                    "[sync] unable to write changes to {}: {reason}",
                    self.path.display()
                );
                self.notify(SyncEvent::WriteFailed { reason });
            }
        }
        self.machine.on_write_complete()
    }

    /// Read the file and merge it into the tracked value in place.
    ///
    /// Returns whether the value was replaced. Failures and unchanged
    /// content leave it untouched.
    async fn reload(&mut self) -> bool {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reload_failed(format!("read failed: {e}"));
                return false;
            }
        };

        let hash = content_hash(&bytes);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            crate::debug_event!("sync", "unchanged (hash match)", "{}", self.path.display());
            self.notify(SyncEvent::Unchanged);
            return false;
        }

        let decoded = match self.codec.decode(&bytes) {
            Ok(value) if is_container(&value) => value,
            Ok(_) => {
                self.reload_failed("root is not a mapping or sequence".to_string());
                return false;
            }
            Err(e) => {
                self.reload_failed(e.to_string());
                return false;
            }
        };

        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        merge_in_place(&mut shared.value.write(), decoded);
        drop(shared);

        self.last_hash = Some(hash);
        crate::log_event!("sync", "reloaded from disk", "{}", self.path.display());
        self.notify(SyncEvent::Reloaded);
        true
    }

    fn reload_failed(&self, reason: String) {
        tracing::error!(
            "[sync] reload of {} abandoned: {reason}",
            self.path.display()
        );
        self.notify(SyncEvent::ReloadFailed { reason });
    }

    /// Write out unflushed edits, then stop watching.
    async fn shutdown(&mut self, final_value: Value) {
        if self.write_in_flight {
            // Let the in-flight write land first so it cannot overwrite ours
            while let Some(event) = self.events_rx.recv().await {
                if let EngineEvent::WriteDone(result) = event {
                    self.finish_write(result);
                    break;
                }
            }
        }

        if self.flush_on_shutdown || self.machine.has_unflushed_changes() {
            match self.codec.encode(&final_value) {
                Ok(bytes) => match tokio::fs::write(&self.path, &bytes).await {
                    Ok(()) => {
                        crate::log_event!("sync", "flushed on drop", "{}", self.path.display());
                    }
                    Err(e) => {
                        tracing::error!(
                            "[sync] unable to write final changes to {}: {e}",
                            self.path.display()
                        );
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "[sync] unable to encode final changes for {}: {e}",
                        self.path.display()
                    );
                }
            }
        }

        if let Some(watcher) = self.watcher.take() {
            crate::debug_event!("sync", "unwatching", "{}", watcher.path().display());
        }
    }

    fn notify(&self, event: SyncEvent) {
        match self.notifier.send(event.clone()) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "{event:?} to {count} subscribers");
            }
            Err(_) => {
                crate::debug_event!("broadcast", "dropped", "no subscribers for {event:?}");
            }
        }
    }
}
