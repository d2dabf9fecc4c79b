//! Configuration module for treemirror.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TREEMIRROR_` and use double
//! underscores to separate nested levels:
//! - `TREEMIRROR_MIRROR__QUIESCENCE_MS=500` sets `mirror.quiescence_ms`
//! - `TREEMIRROR_MIRROR__PRUNE_REMOVED=false` sets `mirror.prune_removed`
//! - `TREEMIRROR_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Config file looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "treemirror.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TREEMIRROR_";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Change aggregation and dispatch settings
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MirrorConfig {
    /// Quiet period (milliseconds) after the last event before a batch is dispatched
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// Capacity of the channel between the notify callback and the engine
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Unregister watches of directories removed from the source tree
    #[serde(default = "default_true")]
    pub prune_removed: bool,

    /// Clear and repopulate every destination before monitoring starts
    #[serde(default = "default_true")]
    pub initial_copy: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides (`target = "level"`)
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_quiescence_ms() -> u64 {
    5_000
}
fn default_event_buffer() -> usize {
    4_096
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            event_buffer: default_event_buffer(),
            prune_removed: true,
            initial_copy: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// Uses `config_path` when given, otherwise `treemirror.toml` in the
    /// current directory. A missing file is not an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self::figment(&path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore separates nested levels, single underscore
            // stays inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, self.to_toml()?)?;

        Ok(())
    }
}
