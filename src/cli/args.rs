//! CLI argument parsing using clap.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use confsync::{OptionsOverride, Settings};

#[derive(Parser, Debug)]
#[command(name = "confsync")]
#[command(version, about = "Keep JSON/YAML files synchronized with live values")]
pub struct Cli {
    /// TOML settings file (defaults, then this file, then CONFSYNC_* env vars)
    #[arg(long, global = true, env = "CONFSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub options: OptionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings from `--config` when given, otherwise defaults and environment.
    pub fn settings(&self) -> Result<Settings> {
        match &self.config {
            Some(path) => Settings::load_from(path).with_context(|| {
                format!("failed to load configuration from {}", path.display())
            }),
            None => Settings::from_env().context("failed to load configuration from environment"),
        }
    }
}

/// Sync option overrides shared by all commands.
#[derive(Args, Debug, Default)]
pub struct OptionArgs {
    /// Indentation width for written files
    #[arg(long = "indent", global = true)]
    pub indentation_spaces: Option<usize>,

    /// YAML depth at which nested containers are written inline
    #[arg(long, global = true)]
    pub inline_level: Option<usize>,

    /// Debounce window before local changes are written (ms)
    #[arg(long = "flush-ms", global = true)]
    pub flush_milliseconds: Option<u64>,

    /// Grace period for duplicate file notifications (ms)
    #[arg(long = "grace-ms", global = true)]
    pub double_fire_grace_period: Option<u64>,
}

impl OptionArgs {
    pub fn to_override(&self) -> OptionsOverride {
        OptionsOverride {
            indentation_spaces: self.indentation_spaces,
            inline_level: self.inline_level,
            flush_milliseconds: self.flush_milliseconds,
            double_fire_grace_period: self.double_fire_grace_period,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a file and print it as JSON
    Show {
        /// JSON or YAML file
        file: PathBuf,

        /// Only print the value at this JSON pointer
        #[arg(short, long)]
        pointer: Option<String>,
    },

    /// Set a value in a file through the sync engine
    Set {
        /// JSON or YAML file
        file: PathBuf,

        /// JSON pointer to set, e.g. /server/port
        pointer: String,

        /// New value as JSON (bare words are taken as strings)
        value: String,
    },

    /// Track a file and report every reload until interrupted
    Watch {
        /// JSON or YAML file
        file: PathBuf,
    },

    /// Display the resolved settings
    Config,
}
