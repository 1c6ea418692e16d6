//! Configuration management
//!
//! Settings live in `settings.json` inside the catwise directory:
//! ```json
//! {
//!   "classification": { "autoAcceptThreshold": 0.95, "batchSize": 10, ... },
//!   "rerank": { "confidenceThreshold": 0.9 },
//!   "retry": { "maxAttempts": 3 },
//!   "oracle": { "endpoint": "https://...", "model": "..." }
//! }
//! ```
//! Unknown top-level keys are preserved when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    classification: ClassificationConfig,
    #[serde(default)]
    rerank: RerankConfig,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    oracle: OracleConfig,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Options for the primary classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationConfig {
    /// Minimum top score persisted without review
    pub auto_accept_threshold: f64,
    /// Merchants per ranking oracle call
    pub batch_size: usize,
    pub parallel_workers: usize,
    /// Persist uncertain results unreviewed instead of prompting
    pub skip_manual_review: bool,
    /// Corrections of suggestions at least this confident become vendor rules
    pub vendor_rule_min_confidence: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 0.95,
            batch_size: 10,
            parallel_workers: 4,
            skip_manual_review: false,
            vendor_rule_min_confidence: 0.85,
        }
    }
}

/// Options for re-ranking low-confidence classifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankConfig {
    /// Classifications below this confidence are re-ranked
    pub confidence_threshold: f64,
    pub batch_size: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.90,
            batch_size: 25,
        }
    }
}

/// Retry policy around ranking oracle calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// HTTP ranking oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleConfig {
    /// OpenAI-compatible chat completions URL
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "CATWISE_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl OracleConfig {
    /// API key read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

/// Catwise configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub classification: ClassificationConfig,
    pub rerank: RerankConfig,
    pub retry: RetryConfig,
    pub oracle: OracleConfig,
    // Keep unmanaged keys for preservation when saving
    _other: HashMap<String, serde_json::Value>,
}

impl Config {
    /// Load config from the catwise directory
    ///
    /// Environment variables override file values:
    /// `CATWISE_AUTO_ACCEPT_THRESHOLD`, `CATWISE_BATCH_SIZE`,
    /// `CATWISE_PARALLEL_WORKERS`, `CATWISE_SKIP_MANUAL_REVIEW`,
    /// `CATWISE_ORACLE_ENDPOINT`, `CATWISE_ORACLE_MODEL`.
    pub fn load(catwise_dir: &Path) -> Result<Self> {
        let settings_path = catwise_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Invalid {}: {}", settings_path.display(), e)))?
        } else {
            SettingsFile::default()
        };

        let mut config = Self {
            classification: raw.classification,
            rerank: raw.rerank,
            retry: raw.retry,
            oracle: raw.oracle,
            _other: raw.other,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the catwise directory
    pub fn save(&self, catwise_dir: &Path) -> Result<()> {
        let settings = SettingsFile {
            classification: self.classification.clone(),
            rerank: self.rerank.clone(),
            retry: self.retry.clone(),
            oracle: self.oracle.clone(),
            other: self._other.clone(),
        };
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(catwise_dir.join("settings.json"), content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<f64>("CATWISE_AUTO_ACCEPT_THRESHOLD")? {
            self.classification.auto_accept_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("CATWISE_BATCH_SIZE")? {
            self.classification.batch_size = v;
        }
        if let Some(v) = env_parse::<usize>("CATWISE_PARALLEL_WORKERS")? {
            self.classification.parallel_workers = v;
        }
        match std::env::var("CATWISE_SKIP_MANUAL_REVIEW").ok().as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => self.classification.skip_manual_review = true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => self.classification.skip_manual_review = false,
            _ => {}
        }
        if let Ok(endpoint) = std::env::var("CATWISE_ORACLE_ENDPOINT") {
            self.oracle.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("CATWISE_ORACLE_MODEL") {
            self.oracle.model = model;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.classification;
        check_unit_interval("autoAcceptThreshold", c.auto_accept_threshold)?;
        check_unit_interval("vendorRuleMinConfidence", c.vendor_rule_min_confidence)?;
        check_unit_interval("confidenceThreshold", self.rerank.confidence_threshold)?;
        if c.batch_size == 0 || self.rerank.batch_size == 0 {
            return Err(Error::config("batchSize must be at least 1"));
        }
        if c.parallel_workers == 0 {
            return Err(Error::config("parallelWorkers must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.maxAttempts must be at least 1"));
        }
        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{} must be between 0 and 1, got {}", name, value)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.classification.auto_accept_threshold, 0.95);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.rerank.batch_size, 25);
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"classification": {"batchSize": 20}, "theme": "dark"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.classification.batch_size, 20);
        assert_eq!(config.classification.parallel_workers, 4);

        // Unmanaged keys survive a save
        config.save(dir.path()).unwrap();
        let saved = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
        assert!(saved.contains("\"theme\""));
        assert!(saved.contains("\"batchSize\": 20"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.classification.auto_accept_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.classification.parallel_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));
    }
}
