//! Command implementations for the CLI.

pub mod config;
pub mod set;
pub mod show;
pub mod watch;
