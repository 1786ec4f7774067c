//! Serve command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::infra::analyzer::{DeepAnalyzer, DisabledAnalyzer};
use crate::server;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Skip deep analysis on save, even if enabled in config
    #[arg(long)]
    pub no_deep: bool,
}

pub async fn execute(args: ServeArgs, app: &App) -> Result<()> {
    let deep: Arc<dyn DeepAnalyzer> = if args.no_deep {
        Arc::new(DisabledAnalyzer)
    } else {
        app.deep_analyzer()?
    };

    tracing::info!(
        "Serving diagnostics over stdio (worker: {}, pool: {})",
        app.config().worker.command,
        app.config().worker.pool_size
    );

    server::serve(
        app.config(),
        app.launcher(),
        deep,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await?;

    tracing::info!("Editor session ended");
    Ok(())
}
