//! Configuration model for Sculptor

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sculptor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SculptorConfig {
    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub deep: DeepConfig,
}

impl SculptorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.command.trim().is_empty() {
            return Err(invalid("worker.command", "must not be empty"));
        }
        if self.worker.pool_size == 0 {
            return Err(invalid("worker.pool_size", "must be at least 1"));
        }
        if self.worker.response_timeout_ms == 0 {
            return Err(invalid("worker.response_timeout_ms", "must be at least 1"));
        }
        if self.realtime.max_concurrent == 0 {
            return Err(invalid("realtime.max_concurrent", "must be at least 1"));
        }
        if self.deep.enabled && url::Url::parse(&self.deep.url).is_err() {
            return Err(invalid(
                "deep.url",
                &format!("'{}' is not a valid URL", self.deep.url),
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Language analysis engine spawned into the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "defaults::command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "defaults::pool_size")]
    pub pool_size: usize,

    #[serde(default = "defaults::language_id")]
    pub language_id: String,

    /// `source` used when the engine omits one
    #[serde(default = "defaults::source_name")]
    pub source_name: String,

    #[serde(default = "defaults::response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: defaults::command(),
            args: Vec::new(),
            pool_size: defaults::pool_size(),
            language_id: defaults::language_id(),
            source_name: defaults::source_name(),
            response_timeout_ms: defaults::response_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Debounced realtime analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "defaults::debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::debounce_ms(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

impl RealtimeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Static-analysis collaborator called on save
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepConfig {
    #[serde(default = "defaults::deep_enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::deep_url")]
    pub url: String,

    #[serde(default = "defaults::deep_timeout_secs")]
    pub timeout_secs: u64,

    /// Flat `line`/`endLine` fields are 1-based and need converting
    #[serde(default = "defaults::one_based_lines")]
    pub one_based_lines: bool,

    #[serde(default = "defaults::upload_field")]
    pub upload_field: String,
}

impl Default for DeepConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::deep_enabled(),
            url: defaults::deep_url(),
            timeout_secs: defaults::deep_timeout_secs(),
            one_based_lines: defaults::one_based_lines(),
            upload_field: defaults::upload_field(),
        }
    }
}

mod defaults {
    // Worker
    pub fn command() -> String {
        "pylsp".to_string()
    }
    pub fn pool_size() -> usize {
        3
    }
    pub fn language_id() -> String {
        "python".to_string()
    }
    pub fn source_name() -> String {
        "pylsp".to_string()
    }
    pub fn response_timeout_ms() -> u64 {
        10_000
    }

    // Realtime
    pub fn debounce_ms() -> u64 {
        400
    }
    pub fn max_concurrent() -> usize {
        8
    }

    // Deep
    pub fn deep_enabled() -> bool {
        true
    }
    pub fn deep_url() -> String {
        "http://localhost:8085/analyze".to_string()
    }
    pub fn deep_timeout_secs() -> u64 {
        60
    }
    pub fn one_based_lines() -> bool {
        true
    }
    pub fn upload_field() -> String {
        "nb_file".to_string()
    }
}
