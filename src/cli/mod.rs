//! CLI module for confsync.
//!
//! Provides command-line parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
