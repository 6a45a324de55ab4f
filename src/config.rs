//! skillrun Configuration Module
//!
//! Config is stored in `~/.config/skillrun/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GOOGLE_API_KEY`,
//!    `SKILLRUN_DEFAULT_VENDOR`, `SKILLRUN_SKILLS_PATH`, `SKILLRUN_CHECKPOINT_DIR`)
//! 2. Config file
//! 3. Defaults

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::provider::{ApiKeys, VendorDefaults};
use crate::runtime::{
    EngineSettings, DEFAULT_MAX_PARALLEL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_VENDOR,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub api_keys: ApiKeyConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub skills: SkillsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Vendor used when the request names none (gemini if unset)
    pub default_vendor: Option<String>,

    /// Model for the default vendor
    pub default_model: Option<String>,

    /// Default model per vendor, on top of the built-in table
    #[serde(default)]
    pub models: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub google: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_parallel_tasks: usize,
    /// Engine-level retries when validation fails
    pub max_retries: u32,
    pub human_review: bool,
    /// Linear backoff unit between task attempts
    pub retry_base_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: DEFAULT_MAX_PARALLEL,
            max_retries: DEFAULT_MAX_RETRIES,
            human_review: true,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub dir: PathBuf,
    pub retention_days: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            dir: PathBuf::from("./data/checkpoints"),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillsConfig {
    /// Root directory holding one sub-directory per task set
    pub path: PathBuf,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./skills-library"),
        }
    }
}

impl EngineConfig {
    /// Returns `~/.config/skillrun/` on Unix, `%APPDATA%/skillrun/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skillrun")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| EngineError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| EngineError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Save to `path`, creating the parent directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| EngineError::ConfigError {
                reason: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| EngineError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| EngineError::ConfigError {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Non-empty environment variables take precedence over file values.
    pub fn with_env(mut self) -> Self {
        if let Some(key) = non_empty_env("ANTHROPIC_API_KEY") {
            self.api_keys.anthropic = Some(key);
        }
        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Some(key) = non_empty_env("GOOGLE_API_KEY") {
            self.api_keys.google = Some(key);
        }
        if let Some(vendor) = non_empty_env("SKILLRUN_DEFAULT_VENDOR") {
            self.llm.default_vendor = Some(vendor);
        }
        if let Some(path) = non_empty_env("SKILLRUN_SKILLS_PATH") {
            self.skills.path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty_env("SKILLRUN_CHECKPOINT_DIR") {
            self.checkpoint.dir = PathBuf::from(dir);
        }
        self
    }

    pub fn api_keys(&self) -> ApiKeys {
        ApiKeys {
            anthropic: self.api_keys.anthropic.clone(),
            openai: self.api_keys.openai.clone(),
            google: self.api_keys.google.clone(),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.checkpoint.retention_days * 86_400)
    }

    /// Engine settings derived from this config
    pub fn engine_settings(&self) -> EngineSettings {
        let vendor_defaults = self
            .llm
            .models
            .iter()
            .fold(VendorDefaults::default(), |defaults, (vendor, model)| {
                defaults.with_model(vendor, model)
            });

        EngineSettings {
            default_vendor: self
                .llm
                .default_vendor
                .clone()
                .unwrap_or_else(|| DEFAULT_VENDOR.to_string()),
            default_model: self.llm.default_model.clone(),
            max_retries: self.execution.max_retries,
            human_review: self.execution.human_review,
            max_parallel: self.execution.max_parallel_tasks,
            retry_base_delay: Duration::from_millis(self.execution.retry_base_delay_ms),
            vendor_defaults,
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn config_path_contains_skillrun() {
        let path = EngineConfig::config_path();
        assert!(path.to_string_lossy().contains("skillrun"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = EngineConfig::default().engine_settings();
        assert_eq!(settings.default_vendor, "gemini");
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.max_parallel, 10);
        assert!(settings.human_review);
        assert_eq!(settings.retry_base_delay, Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [llm]
            default_vendor = "openai"
            [llm.models]
            openai = "gpt-4.1"
            [execution]
            max_retries = 0
            [checkpoint]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.execution.max_parallel_tasks, 10);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Memory);
        assert_eq!(config.checkpoint.retention_days, 7);

        let settings = config.engine_settings();
        assert_eq!(settings.default_vendor, "openai");
        assert_eq!(settings.max_retries, 0);
        assert_eq!(settings.vendor_defaults.model_for("openai"), "gpt-4.1");
        assert_eq!(settings.vendor_defaults.model_for("gemini"), "gemini-3-flash-preview");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = EngineConfig::default();
        config.api_keys.google = Some("g-key".into());
        config.skills.path = PathBuf::from("/srv/skills");

        config.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_default_and_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.toml");
        assert_eq!(EngineConfig::load_from(&missing).unwrap(), EngineConfig::default());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[execution\nmax_retries = ").unwrap();
        assert_eq!(EngineConfig::load_from(&bad).unwrap_err().code(), "SKR-006");
    }

    #[test]
    #[serial]
    fn env_overrides_config() {
        env::set_var("GOOGLE_API_KEY", "from-env");
        env::set_var("SKILLRUN_CHECKPOINT_DIR", "/tmp/ckpt");

        let mut config = EngineConfig::default();
        config.api_keys.google = Some("from-file".into());
        let config = config.with_env();

        assert_eq!(config.api_keys().google.as_deref(), Some("from-env"));
        assert_eq!(config.checkpoint.dir, PathBuf::from("/tmp/ckpt"));

        env::remove_var("GOOGLE_API_KEY");
        env::remove_var("SKILLRUN_CHECKPOINT_DIR");
    }

    #[test]
    #[serial]
    fn empty_env_does_not_override() {
        env::set_var("OPENAI_API_KEY", "");

        let mut config = EngineConfig::default();
        config.api_keys.openai = Some("sk-from-file".into());
        let config = config.with_env();

        assert_eq!(config.api_keys.openai.as_deref(), Some("sk-from-file"));
        env::remove_var("OPENAI_API_KEY");
    }
}
