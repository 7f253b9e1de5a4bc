//! Configuration handling for schema_promote

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}

/// Represents the complete schema_promote configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Label of the environment every other environment is compared against
    pub baseline: String,
    /// Environment label to snapshot file, in comparison order
    #[serde(default)]
    pub environments: IndexMap<String, String>,
    /// Extra snapshot files to discover; the file stem is the label
    #[serde(default)]
    pub snapshot_glob: Option<String>,
    #[serde(default)]
    pub comparison: CompareOptions,
    #[serde(default)]
    pub scripts: ScriptOptions,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Check the settings that cannot be expressed through serde defaults
    pub fn validate(&self) -> Result<()> {
        if self.baseline.trim().is_empty() {
            return Err(Error::ConfigError("baseline must not be empty".to_string()));
        }
        if self.environments.is_empty() && self.snapshot_glob.is_none() {
            return Err(Error::ConfigError(
                "at least one of [environments] or snapshot_glob is required".to_string(),
            ));
        }
        if self.scripts.batch_delimiter.trim().is_empty() {
            return Err(Error::ConfigError("scripts.batch_delimiter must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Diff engine behaviour
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CompareOptions {
    /// Strip `--` and `/* */` comments before comparing definitions
    #[serde(default)]
    pub strip_comments: bool,
    /// Schemas whose changes are flagged Forbidden
    #[serde(default)]
    pub protected_schemas: Vec<String>,
}

fn default_batch_delimiter() -> String {
    crate::schema::script::BATCH_DELIMITER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_output_directory() -> String {
    "./sync_scripts".to_string()
}

/// Script generation settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScriptOptions {
    #[serde(default = "default_batch_delimiter")]
    pub batch_delimiter: String,
    #[serde(default = "default_true")]
    pub include_rollback: bool,
    /// Emit a `--` header describing each difference
    #[serde(default = "default_true")]
    pub include_comments: bool,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            batch_delimiter: default_batch_delimiter(),
            include_rollback: true,
            include_comments: true,
            output_directory: default_output_directory(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_log_format() -> String {
    "text".to_string()
}
