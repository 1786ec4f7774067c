//! Application container for Sculptor

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::OutputContext;
use crate::infra::analyzer::{self, DeepAnalyzer};
use crate::infra::lsp::{CommandLauncher, WorkerLauncher};
use crate::models::config::SculptorConfig;
use crate::services::config::{ConfigService, DefaultConfigService};

pub struct App {
    root: PathBuf,
    pub(crate) output: OutputContext,
    pub(crate) config_service: Arc<dyn ConfigService>,
    pub(crate) config: SculptorConfig,
    config_path: Option<PathBuf>,
}

impl App {
    /// Load configuration for the current directory; `config_path` replaces
    /// the global and project files
    pub async fn new(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let root = std::env::current_dir()?;

        tracing::debug!("Initializing Sculptor at {:?}", root);

        let output = OutputContext::new(root.clone());
        let config_service = Arc::new(DefaultConfigService::new(&root));
        let config = config_service.load(config_path.as_deref()).await?;

        tracing::debug!(
            "Config loaded (worker: {}, deep: {})",
            config.worker.command,
            if config.deep.enabled { "enabled" } else { "disabled" }
        );

        Ok(Self {
            root,
            output,
            config_service,
            config,
            config_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SculptorConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn launcher(&self) -> Arc<dyn WorkerLauncher> {
        Arc::new(CommandLauncher::from_config(&self.config.worker))
    }

    pub fn deep_analyzer(&self) -> anyhow::Result<Arc<dyn DeepAnalyzer>> {
        Ok(Arc::from(analyzer::from_config(&self.config.deep)?))
    }
}
