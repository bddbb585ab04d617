//! Options and settings for tracked files.
//!
//! Two layers live here:
//!
//! - [`SyncOptions`] is the resolved, immutable snapshot a binding owns for
//!   its whole life. It is built from [`OptionsOverride`]s, where a missing or
//!   zero field falls back to the next layer and finally to the defaults.
//! - [`Settings`] is the file/environment configuration used by the CLI and
//!   by applications that want layered loading:
//!   defaults, then a TOML file, then `CONFSYNC_` environment variables.
//!
//! # Environment Variables
//!
//! Nested levels are separated with a double underscore:
//! - `CONFSYNC_SYNC__FLUSH_MILLISECONDS=1000` sets `sync.flush_milliseconds`
//! - `CONFSYNC_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INDENTATION_SPACES: usize = 4;
pub const DEFAULT_INLINE_LEVEL: usize = 8;
pub const DEFAULT_FLUSH_MILLISECONDS: u64 = 5000;
pub const DEFAULT_DOUBLE_FIRE_GRACE_PERIOD: u64 = 50;

const ENV_PREFIX: &str = "CONFSYNC_";

/// Resolved options for one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Indentation width for encoded output.
    #[serde(default = "default_indentation_spaces")]
    pub indentation_spaces: usize,

    /// YAML nesting depth at which containers collapse to flow style.
    #[serde(default = "default_inline_level")]
    pub inline_level: usize,

    /// Debounce window between a local change and the write.
    #[serde(default = "default_flush_milliseconds")]
    pub flush_milliseconds: u64,

    /// Grace period absorbing duplicate file notifications before a reload.
    #[serde(default = "default_double_fire_grace_period")]
    pub double_fire_grace_period: u64,
}

fn default_indentation_spaces() -> usize {
    DEFAULT_INDENTATION_SPACES
}
fn default_inline_level() -> usize {
    DEFAULT_INLINE_LEVEL
}
fn default_flush_milliseconds() -> u64 {
    DEFAULT_FLUSH_MILLISECONDS
}
fn default_double_fire_grace_period() -> u64 {
    DEFAULT_DOUBLE_FIRE_GRACE_PERIOD
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            indentation_spaces: DEFAULT_INDENTATION_SPACES,
            inline_level: DEFAULT_INLINE_LEVEL,
            flush_milliseconds: DEFAULT_FLUSH_MILLISECONDS,
            double_fire_grace_period: DEFAULT_DOUBLE_FIRE_GRACE_PERIOD,
        }
    }
}

impl SyncOptions {
    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_milliseconds)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.double_fire_grace_period)
    }

    /// Resolve layered overrides against the defaults.
    ///
    /// Layers are given highest precedence first. A field that is `None` or
    /// zero in a layer is taken from the next one.
    pub fn resolve<'a>(layers: impl IntoIterator<Item = &'a OptionsOverride>) -> Self {
        let layers: Vec<&OptionsOverride> = layers.into_iter().collect();
        let defaults = Self::default();

        fn pick<T, F>(layers: &[&OptionsOverride], field: F, fallback: T) -> T
        where
            T: Copy + PartialEq + Default,
            F: Fn(&OptionsOverride) -> Option<T>,
        {
            layers
                .iter()
                .filter_map(|layer| field(*layer))
                .find(|value| *value != T::default())
                .unwrap_or(fallback)
        }

        Self {
            indentation_spaces: pick(
                &layers,
                |o| o.indentation_spaces,
                defaults.indentation_spaces,
            ),
            inline_level: pick(&layers, |o| o.inline_level, defaults.inline_level),
            flush_milliseconds: pick(
                &layers,
                |o| o.flush_milliseconds,
                defaults.flush_milliseconds,
            ),
            double_fire_grace_period: pick(
                &layers,
                |o| o.double_fire_grace_period,
                defaults.double_fire_grace_period,
            ),
        }
    }
}

/// Caller-supplied options; unset fields fall back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indentation_spaces: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_level: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_milliseconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_fire_grace_period: Option<u64>,
}

impl OptionsOverride {
    pub fn indentation_spaces(mut self, spaces: usize) -> Self {
        self.indentation_spaces = Some(spaces);
        self
    }

    pub fn inline_level(mut self, level: usize) -> Self {
        self.inline_level = Some(level);
        self
    }

    pub fn flush_milliseconds(mut self, ms: u64) -> Self {
        self.flush_milliseconds = Some(ms);
        self
    }

    pub fn double_fire_grace_period(mut self, ms: u64) -> Self {
        self.double_fire_grace_period = Some(ms);
        self
    }
}

impl From<SyncOptions> for OptionsOverride {
    fn from(options: SyncOptions) -> Self {
        Self {
            indentation_spaces: Some(options.indentation_spaces),
            inline_level: Some(options.inline_level),
            flush_milliseconds: Some(options.flush_milliseconds),
            double_fire_grace_period: Some(options.double_fire_grace_period),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for all modules.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `confsync::engine = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Sync options applied to every file loaded with these settings.
    #[serde(default)]
    pub sync: SyncOptions,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Defaults layered with `CONFSYNC_` environment variables.
    pub fn from_env() -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Defaults, then the TOML file at `path` (if it exists), then environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
