//! Application configuration for Curricula.
//!
//! User config lives at `~/.curricula/curricula.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CurriculaError, Result};
use crate::types::OrphanPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "curricula.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".curricula";

// ---------------------------------------------------------------------------
// Config structs (matching curricula.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Graph store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Similarity judge (LLM endpoint) settings.
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Harmonization batching and fan-out.
    #[serde(default)]
    pub harmonizer: HarmonizerConfig,

    /// Object-store mirror used by graph sync.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Graph sync policy.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL graph database. `~` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.curricula/graph.db".into()
}

/// `[judge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Base URL of an OpenAI-compatible API (Ollama, OpenRouter, vLLM...).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    /// Leave unset for endpoints that need no key, such as a local Ollama.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay before the single retry of a failed call.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: 0.0,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "gpt-oss:120b".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_retry_backoff_ms() -> u64 {
    2_000
}

/// `[harmonizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonizerConfig {
    /// Concepts per judge call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum judge calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Re-submit concepts that already have an alignment.
    #[serde(default)]
    pub include_aligned: bool,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            include_aligned: false,
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_concurrency() -> usize {
    4
}

/// `[object_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Local directory holding one sub-directory per bucket.
    #[serde(default = "default_object_root")]
    pub root: String,

    /// Bucket holding course artifacts.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: default_object_root(),
            bucket: default_bucket(),
        }
    }
}

fn default_object_root() -> String {
    "~/.curricula/objects".into()
}
fn default_bucket() -> String {
    "training-content".into()
}

/// `[sync]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// What to do with graph nodes whose artifact is gone.
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

// ---------------------------------------------------------------------------
// Harmonize config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harmonization settings, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct HarmonizeConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub include_aligned: bool,
    /// Timeout for one judge call.
    pub judge_timeout: Duration,
    /// Backoff before the single retry of a failed judge call.
    pub retry_backoff: Duration,
}

impl From<&AppConfig> for HarmonizeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.harmonizer.batch_size,
            concurrency: config.harmonizer.concurrency,
            include_aligned: config.harmonizer.include_aligned,
            judge_timeout: Duration::from_secs(config.judge.timeout_secs),
            retry_backoff: Duration::from_millis(config.judge.retry_backoff_ms),
        }
    }
}

impl HarmonizeConfig {
    /// Reject settings the harmonizer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CurriculaError::config("harmonizer.batch_size must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(CurriculaError::config("harmonizer.concurrency must be at least 1"));
        }
        if self.judge_timeout.is_zero() {
            return Err(CurriculaError::config("judge.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.curricula/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CurriculaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.curricula/curricula.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CurriculaError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CurriculaError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CurriculaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CurriculaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CurriculaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CurriculaError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Check the judge endpoint and credentials before any run starts.
///
/// Returns the API key, if one is configured.
pub fn validate_judge_config(config: &AppConfig) -> Result<Option<String>> {
    let judge = &config.judge;

    let url = url::Url::parse(&judge.base_url).map_err(|e| {
        CurriculaError::config(format!("invalid judge.base_url '{}': {e}", judge.base_url))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CurriculaError::config(format!(
            "judge.base_url must be http(s), got '{}'",
            url.scheme()
        )));
    }
    if judge.model.trim().is_empty() {
        return Err(CurriculaError::config("judge.model must not be empty"));
    }

    match &judge.api_key_env {
        None => Ok(None),
        Some(var_name) => match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(Some(val)),
            _ => Err(CurriculaError::config(format!(
                "judge API key not found. Set the {var_name} environment variable."
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("training-content"));
        assert!(toml_str.contains("orphan_policy = \"flag\""));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[judge]
base_url = "https://openrouter.ai/api/v1"
api_key_env = "OPENROUTER_API_KEY"

[harmonizer]
batch_size = 20

[sync]
orphan_policy = "remove"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.harmonizer.batch_size, 20);
        assert_eq!(config.harmonizer.concurrency, 4);
        assert_eq!(config.judge.timeout_secs, 120);
        assert_eq!(config.judge.api_key_env.as_deref(), Some("OPENROUTER_API_KEY"));
        assert_eq!(config.sync.orphan_policy, OrphanPolicy::Remove);
    }

    #[test]
    fn harmonize_config_from_app_config() {
        let app = AppConfig::default();
        let h = HarmonizeConfig::from(&app);
        assert_eq!(h.batch_size, 50);
        assert_eq!(h.judge_timeout, Duration::from_secs(120));
        assert!(!h.include_aligned);
        assert!(h.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut app = AppConfig::default();
        app.harmonizer.batch_size = 0;
        let err = HarmonizeConfig::from(&app).validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn judge_validation_without_key() {
        let config = AppConfig::default();
        assert_eq!(validate_judge_config(&config).expect("valid"), None);
    }

    #[test]
    fn judge_validation_missing_key() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.judge.api_key_env = Some("CURRICULA_TEST_NONEXISTENT_KEY_12345".into());
        let result = validate_judge_config(&config);
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn judge_validation_bad_url() {
        let mut config = AppConfig::default();
        config.judge.base_url = "not a url".into();
        assert!(validate_judge_config(&config).is_err());

        config.judge.base_url = "ftp://models.internal".into();
        assert!(validate_judge_config(&config).is_err());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/lib/graph.db").unwrap(), PathBuf::from("/var/lib/graph.db"));
    }
}
