//! Sync state machine.
//!
//! Pure transition logic, no I/O and no clocks. The driver feeds it events
//! and executes the [`Action`] each transition returns.
//!
//! ```text
//!             local change                 flush timer (current ticket)
//!   Idle ----------------------> FlushPending ----------------------> Writing
//!    ^  \                           |                                   |
//!    |   \ file change              | file change                       | write done
//!    |    v                         v                                   v
//!    |   Reloading <----------------+                      Idle, or FlushPending
//!    |      |                                              when edits arrived
//!    +------+ reload applied                               during the write
//! ```
//!
//! Echo suppression: file changes are ignored while `Writing` or `Reloading`,
//! local changes never schedule a write while `Reloading`. They are remembered
//! in `dirty` instead: an applied reload overwrites them, but a reload that
//! was skipped (identical content) or abandoned (decode failure) leaves them
//! in memory, so they go back to `FlushPending`.
//!
//! Timers are never cancelled. Each one carries a ticket and is a no-op on
//! fire unless its ticket is still the current one.

use std::time::Duration;

/// Ticket identifying a scheduled timer.
pub type Ticket = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    /// Debounce timer running.
    FlushPending { ticket: Ticket },
    /// A write is in flight. `dirty` is set when local edits arrive meanwhile.
    Writing { dirty: bool },
    /// Grace timer running or reload in progress. `dirty` is set when
    /// unwritten local edits exist.
    Reloading { ticket: Ticket, dirty: bool },
}

/// Work the driver must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartFlushTimer { ticket: Ticket, delay: Duration },
    Write,
    StartReloadTimer { ticket: Ticket, delay: Duration },
    Reload,
}

#[derive(Debug)]
pub struct SyncMachine {
    state: SyncState,
    next_ticket: Ticket,
    flush_window: Duration,
    grace_period: Duration,
}

impl SyncMachine {
    pub fn new(flush_window: Duration, grace_period: Duration) -> Self {
        Self {
            state: SyncState::Idle,
            next_ticket: 0,
            flush_window,
            grace_period,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Whether unwritten local edits exist.
    pub fn has_unflushed_changes(&self) -> bool {
        matches!(
            self.state,
            SyncState::FlushPending { .. } | SyncState::Writing { dirty: true }
        )
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn schedule_flush(&mut self) -> Action {
        let ticket = self.issue_ticket();
        self.state = SyncState::FlushPending { ticket };
        Action::StartFlushTimer {
            ticket,
            delay: self.flush_window,
        }
    }

    /// The tracked value was mutated by the caller.
    pub fn on_local_change(&mut self) -> Action {
        match self.state {
            SyncState::Idle => self.schedule_flush(),
            // Coalesced into the pending write
            SyncState::FlushPending { .. } => Action::None,
            SyncState::Writing { .. } => {
                self.state = SyncState::Writing { dirty: true };
                Action::None
            }
            // No write while reloading; kept in case the reload is skipped
            SyncState::Reloading { ticket, .. } => {
                self.state = SyncState::Reloading {
                    ticket,
                    dirty: true,
                };
                Action::None
            }
        }
    }

    pub fn on_flush_timer(&mut self, ticket: Ticket) -> Action {
        match self.state {
            SyncState::FlushPending { ticket: current } if current == ticket => {
                self.state = SyncState::Writing { dirty: false };
                Action::Write
            }
            _ => Action::None,
        }
    }

    /// Write now, skipping the rest of the debounce window.
    pub fn on_flush_requested(&mut self) -> Action {
        match self.state {
            SyncState::Idle | SyncState::FlushPending { .. } => {
                self.state = SyncState::Writing { dirty: false };
                Action::Write
            }
            SyncState::Writing { .. } => {
                self.state = SyncState::Writing { dirty: true };
                Action::None
            }
            SyncState::Reloading { ticket, .. } => {
                self.state = SyncState::Reloading {
                    ticket,
                    dirty: true,
                };
                Action::None
            }
        }
    }

    /// The in-flight write finished, successfully or not.
    pub fn on_write_complete(&mut self) -> Action {
        match self.state {
            SyncState::Writing { dirty: true } => self.schedule_flush(),
            SyncState::Writing { dirty: false } => {
                self.state = SyncState::Idle;
                Action::None
            }
            _ => Action::None,
        }
    }

    /// The file changed on disk.
    pub fn on_file_change(&mut self) -> Action {
        match self.state {
            // Our own write echoing back, or an overlapping reload
            SyncState::Writing { .. } | SyncState::Reloading { .. } => Action::None,
            SyncState::Idle | SyncState::FlushPending { .. } => {
                let dirty = matches!(self.state, SyncState::FlushPending { .. });
                let ticket = self.issue_ticket();
                self.state = SyncState::Reloading { ticket, dirty };
                Action::StartReloadTimer {
                    ticket,
                    delay: self.grace_period,
                }
            }
        }
    }

    pub fn on_reload_timer(&mut self, ticket: Ticket) -> Action {
        match self.state {
            SyncState::Reloading { ticket: current, .. } if current == ticket => Action::Reload,
            _ => Action::None,
        }
    }

    /// The file content was merged into the tracked value.
    pub fn on_reload_applied(&mut self) {
        if matches!(self.state, SyncState::Reloading { .. }) {
            self.state = SyncState::Idle;
        }
    }

    /// The reload left the tracked value untouched, either because the file
    /// matched what we last saw or because it could not be decoded.
    pub fn on_reload_skipped(&mut self) -> Action {
        match self.state {
            SyncState::Reloading { dirty: true, .. } => self.schedule_flush(),
            SyncState::Reloading { dirty: false, .. } => {
                self.state = SyncState::Idle;
                Action::None
            }
            _ => Action::None,
        }
    }
}
