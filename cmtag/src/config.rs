//! Settings resolution for cmtag
//!
//! Provides multi-tier resolution with CLI → ENV → TOML → default priority.
//! The resolved [`Settings`] value is immutable; changing the model yields
//! a new value via [`Settings::with_model`].

use crate::services::inference_client::OracleSettings;
use crate::services::reconciliation::PolicyParams;
use cmtag_common::config::{default_backup_dir, resolve_setting, TomlConfig};
use cmtag_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
pub const DEFAULT_ENCODER: &str = "ffmpeg";
pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

pub const ENV_MODEL: &str = "CMTAG_MODEL";
pub const ENV_ENCODER: &str = "CMTAG_ENCODER";
pub const ENV_BACKUP_DIR: &str = "CMTAG_BACKUP_DIR";
pub const ENV_API_BASE_URL: &str = "CMTAG_API_BASE_URL";
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub model: Option<String>,
    pub encoder: Option<String>,
    pub backup_dir: Option<PathBuf>,
}

/// Resolved run settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub encoder: String,
    pub backup_dir: PathBuf,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub policy: PolicyParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            encoder: DEFAULT_ENCODER.to_string(),
            backup_dir: default_backup_dir(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            policy: PolicyParams::default(),
        }
    }
}

impl Settings {
    /// Resolve every setting from CLI, environment, TOML and defaults
    ///
    /// A non-finite coverage threshold is rejected; finite values are
    /// clamped to 0.0-1.0.
    pub fn resolve(overrides: &SettingsOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = Settings::default();

        let model = resolve_setting(overrides.model.as_deref(), ENV_MODEL, toml.model.as_deref())
            .unwrap_or(defaults.model);

        let encoder = resolve_setting(
            overrides.encoder.as_deref(),
            ENV_ENCODER,
            toml.encoder.as_deref(),
        )
        .unwrap_or(defaults.encoder);

        let cli_backup = overrides
            .backup_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let toml_backup = toml
            .backup_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let backup_dir = resolve_setting(cli_backup.as_deref(), ENV_BACKUP_DIR, toml_backup.as_deref())
            .map(PathBuf::from)
            .unwrap_or(defaults.backup_dir);

        let api_base_url = resolve_setting(None, ENV_API_BASE_URL, toml.api_base_url.as_deref())
            .unwrap_or(defaults.api_base_url);

        let request_timeout = toml
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let coverage_threshold = match toml.policy.coverage_threshold {
            Some(t) if !t.is_finite() => {
                return Err(Error::Config(format!(
                    "policy.coverage_threshold must be a number between 0.0 and 1.0, got {}",
                    t
                )))
            }
            Some(t) => t.clamp(0.0, 1.0),
            None => defaults.policy.coverage_threshold,
        };
        let policy = PolicyParams {
            min_keyword_len: toml
                .policy
                .min_keyword_len
                .unwrap_or(defaults.policy.min_keyword_len),
            coverage_threshold,
        };

        let settings = Self {
            model,
            encoder,
            backup_dir,
            api_base_url,
            request_timeout,
            policy,
        };

        info!(
            model = %settings.model,
            encoder = %settings.encoder,
            backup_dir = %settings.backup_dir.display(),
            "Settings resolved"
        );
        Ok(settings)
    }

    /// Copy of these settings using a different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Inference client settings with the given credential
    pub fn oracle_settings(&self, api_key: String) -> OracleSettings {
        OracleSettings {
            model: self.model.clone(),
            api_base_url: self.api_base_url.clone(),
            api_key,
            timeout: self.request_timeout,
        }
    }
}

/// Read the inference API key from the environment
///
/// Missing or blank is a setup error; nothing has been touched yet.
pub fn resolve_api_key() -> Result<String> {
    match std::env::var(ENV_API_KEY) {
        Ok(key) if is_valid_key(&key) => Ok(key.trim().to_string()),
        _ => Err(Error::Config(format!(
            "{} environment variable not set.\n\
             Get your API key from: https://openrouter.ai/keys\n\
             Then set it: export {}='your-key-here'",
            ENV_API_KEY, ENV_API_KEY
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmtag_common::config::PolicyConfig;
    use serial_test::serial;

    fn clear_env() {
        for var in [ENV_MODEL, ENV_ENCODER, ENV_BACKUP_DIR, ENV_API_BASE_URL] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::resolve(&SettingsOverrides::default(), &TomlConfig::default()).unwrap();
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.encoder, DEFAULT_ENCODER);
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.policy, PolicyParams::default());
        assert!(settings.backup_dir.ends_with("music_backups"));
    }

    #[test]
    #[serial]
    fn test_priority_order() {
        clear_env();
        let toml = TomlConfig {
            model: Some("toml/model".to_string()),
            encoder: Some("toml-ffmpeg".to_string()),
            backup_dir: Some(PathBuf::from("/toml/backups")),
            ..Default::default()
        };
        std::env::set_var(ENV_ENCODER, "env-ffmpeg");

        let overrides = SettingsOverrides {
            model: Some("cli/model".to_string()),
            ..Default::default()
        };
        let settings = Settings::resolve(&overrides, &toml).unwrap();
        assert_eq!(settings.model, "cli/model");
        assert_eq!(settings.encoder, "env-ffmpeg");
        assert_eq!(settings.backup_dir, PathBuf::from("/toml/backups"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_policy_from_toml() {
        clear_env();
        let toml = TomlConfig {
            policy: PolicyConfig {
                min_keyword_len: Some(4),
                coverage_threshold: Some(1.5),
            },
            request_timeout_secs: Some(5),
            ..Default::default()
        };
        let settings = Settings::resolve(&SettingsOverrides::default(), &toml).unwrap();
        assert_eq!(settings.policy.min_keyword_len, 4);
        assert_eq!(settings.policy.coverage_threshold, 1.0);
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_non_finite_threshold_rejected() {
        clear_env();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let toml = TomlConfig {
                policy: PolicyConfig {
                    coverage_threshold: Some(bad),
                    ..Default::default()
                },
                ..Default::default()
            };
            assert!(matches!(
                Settings::resolve(&SettingsOverrides::default(), &toml),
                Err(Error::Config(_))
            ));
        }

        let parsed: TomlConfig = toml::from_str("[policy]\ncoverage_threshold = nan\n").unwrap();
        assert!(Settings::resolve(&SettingsOverrides::default(), &parsed).is_err());
    }

    #[test]
    fn test_with_model_leaves_original_unchanged() {
        let original = Settings::default();
        let changed = original.with_model("openai/gpt-4o-mini");
        assert_eq!(original.model, DEFAULT_MODEL);
        assert_eq!(changed.model, "openai/gpt-4o-mini");
        assert_eq!(changed.encoder, original.encoder);
    }

    #[test]
    #[serial]
    fn test_api_key_required() {
        std::env::remove_var(ENV_API_KEY);
        let err = resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("https://openrouter.ai/keys"));

        std::env::set_var(ENV_API_KEY, "   ");
        assert!(resolve_api_key().is_err());

        std::env::set_var(ENV_API_KEY, " sk-or-test ");
        assert_eq!(resolve_api_key().unwrap(), "sk-or-test");

        std::env::remove_var(ENV_API_KEY);
    }
}
