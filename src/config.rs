//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - ted.toml (default configuration)
//! - ted.local.toml (git-ignored local overrides)
//! - Environment variables (TED_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # ted.toml
//! [engine]
//! initial_capacity = 64
//! post_compaction_target_load = 0.5
//! raise_on_dead_rule = false
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TED_ENGINE__INITIAL_CAPACITY=256
//! TED_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluation-engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Initial table capacity; rounded up to a power of two
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// When compaction survives above this load factor, the table array is
    /// doubled instead of rewritten in place
    #[serde(default = "default_target_load")]
    pub post_compaction_target_load: f64,

    /// Raise an error when a rule body constant-folds to false instead of
    /// silently keeping a rule that derives nothing
    #[serde(default)]
    pub raise_on_dead_rule: bool,

    /// Seed for the program RNG
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_initial_capacity() -> usize {
    64
}
fn default_target_load() -> f64 {
    0.5
}
fn default_seed() -> u64 {
    0x5DEE_CE66_D1CE_5EED
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. ted.toml (base configuration)
    /// 2. ted.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (TED_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("ted.toml"))
            .merge(Toml::file("ted.local.toml"))
            .merge(Env::prefixed("TED_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TED_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_capacity: default_initial_capacity(),
            post_compaction_target_load: default_target_load(),
            raise_on_dead_rule: false,
            seed: default_seed(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.initial_capacity, 64);
        assert_eq!(config.engine.post_compaction_target_load, 0.5);
        assert!(!config.engine.raise_on_dead_rule);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("[logging]"));
    }
}
