//! Configuration loading and default path resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config and data directories
pub const APP_DIR_NAME: &str = "cmtag";

/// Name of the folder that receives originals replaced by transcoding
pub const BACKUP_DIR_NAME: &str = "music_backups";

/// On-disk TOML configuration
///
/// Every key is optional; missing keys fall through to environment
/// variables or compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Language model identifier sent to the inference service
    pub model: Option<String>,
    /// Encoder executable (name on PATH or absolute path)
    pub encoder: Option<String>,
    /// Directory receiving originals before a transcoded file replaces them
    pub backup_dir: Option<PathBuf>,
    /// Base URL of the chat-completions API
    pub api_base_url: Option<String>,
    /// HTTP timeout for a single inference request
    pub request_timeout_secs: Option<u64>,
    /// Audit policy tuning
    pub policy: PolicyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Audit policy tuning knobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Words must be strictly longer than this to count as keywords
    pub min_keyword_len: Option<usize>,
    /// Fraction of keywords that must be present (0.0-1.0)
    pub coverage_threshold: Option<f64>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info")
    pub level: Option<String>,
}

/// Resolve a string setting following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
///
/// Blank values at any tier are ignored.
pub fn resolve_setting(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_value: Option<&str>,
) -> Option<String> {
    if let Some(value) = cli_arg.filter(|v| !v.trim().is_empty()) {
        return Some(value.to_string());
    }

    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }

    toml_value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

/// Load the TOML configuration file
///
/// With an explicit path the file must exist. Without one, the platform
/// default location is tried and a missing file yields the empty config.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(TomlConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    tracing::debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Default configuration file path for the platform
///
/// `~/.config/cmtag/config.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Default backup directory
///
/// `~/Desktop/music_backups`, then `~/music_backups`, then `./music_backups`.
pub fn default_backup_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join(BACKUP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR_NAME))
}
