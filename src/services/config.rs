//! Configuration service for Sculptor

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::config::{DeepConfig, RealtimeConfig, SculptorConfig, WorkerConfig};

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Effective configuration; `explicit` replaces the global and project files
    async fn load(&self, explicit: Option<&Path>) -> Result<SculptorConfig, ConfigError>;
    fn config_path(&self, global: bool) -> PathBuf;
    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError>;
}

pub struct DefaultConfigService {
    root: PathBuf,
    global_path: PathBuf,
}

impl DefaultConfigService {
    pub fn new(root: &Path) -> Self {
        Self::with_global_path(root, Self::global_config_path())
    }

    pub fn with_global_path(root: &Path, global_path: PathBuf) -> Self {
        Self {
            root: root.to_path_buf(),
            global_path,
        }
    }

    fn global_config_path() -> PathBuf {
        // XDG standard: ~/.config/sculptor/config.toml
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sculptor")
            .join("config.toml")
    }

    fn project_config_path(&self) -> PathBuf {
        self.root.join(".sculptor").join("config.toml")
    }

    async fn read(path: &Path) -> Result<Option<String>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(tokio::fs::read_to_string(path).await?))
    }

    async fn write_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let config = SculptorConfig::default();
        let content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    async fn load(&self, explicit: Option<&Path>) -> Result<SculptorConfig, ConfigError> {
        let config = match explicit {
            Some(path) => {
                let content = Self::read(path).await?.ok_or_else(|| {
                    ConfigError::NotFound(format!("Config file does not exist: {}", path.display()))
                })?;
                parse(&content)?
            }
            None => {
                let mut config = match Self::read(&self.global_path).await? {
                    Some(content) => parse(&content)?,
                    None => SculptorConfig::default(),
                };
                if let Some(content) = Self::read(&self.project_config_path()).await? {
                    let overlay: ConfigOverlay =
                        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
                    config = overlay.apply(config);
                }
                config
            }
        };

        let config = apply_env_overrides(config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn config_path(&self, global: bool) -> PathBuf {
        if global {
            self.global_path.clone()
        } else {
            self.project_config_path()
        }
    }

    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError> {
        let path = self.config_path(global);

        if path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                key: "config".to_string(),
                message: format!(
                    "Config already exists: {}. Use --force to overwrite.",
                    path.display()
                ),
            });
        }

        Self::write_default_config(&path).await?;
        Ok(path)
    }
}

fn parse(content: &str) -> Result<SculptorConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Project file: each section present replaces the inherited one
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    worker: Option<WorkerConfig>,
    realtime: Option<RealtimeConfig>,
    deep: Option<DeepConfig>,
}

impl ConfigOverlay {
    fn apply(self, base: SculptorConfig) -> SculptorConfig {
        SculptorConfig {
            worker: self.worker.unwrap_or(base.worker),
            realtime: self.realtime.unwrap_or(base.realtime),
            deep: self.deep.unwrap_or(base.deep),
        }
    }
}

fn apply_env_overrides(
    mut config: SculptorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> SculptorConfig {
    if let Some(val) = lookup("SCULPTOR_WORKER_COMMAND") {
        config.worker.command = val;
    }
    if let Some(val) = lookup("SCULPTOR_POOL_SIZE")
        && let Ok(size) = val.parse()
    {
        config.worker.pool_size = size;
    }
    if let Some(val) = lookup("SCULPTOR_DEBOUNCE_MS")
        && let Ok(ms) = val.parse()
    {
        config.realtime.debounce_ms = ms;
    }
    if let Some(val) = lookup("SCULPTOR_DEEP_URL") {
        config.deep.url = val;
    }
    if let Some(val) = lookup("SCULPTOR_DEEP_ENABLED") {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.deep.enabled = true,
            "0" | "false" | "no" | "off" => config.deep.enabled = false,
            _ => tracing::warn!("Ignoring SCULPTOR_DEEP_ENABLED={}", val),
        }
    }
    config
}
