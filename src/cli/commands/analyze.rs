//! Analyze command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::error::AnalyzerError;
use crate::infra::lsp::{PoolHealth, WorkerPool, WorkerSettings};
use crate::models::lsp::path_to_uri;
use crate::models::{Diagnostic, DiagnosticSeverity, DiagnosticSource};
use crate::services::DiagnosticCache;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// File to analyze
    pub file: PathBuf,

    /// Also run the deep analyzer
    #[arg(long)]
    pub deep: bool,

    /// Only report diagnostics at least this severe (error, warning, information, hint)
    #[arg(long, short = 's')]
    pub severity: Option<DiagnosticSeverity>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    file: String,
    count: usize,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deep_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<PoolHealth>,
}

pub async fn execute(args: AnalyzeArgs, app: &App, verbose: bool) -> Result<()> {
    let ctx = &app.output;

    let path = if args.file.is_absolute() {
        args.file.clone()
    } else {
        app.root().join(&args.file)
    };
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let uri = path_to_uri(&path);

    let config = app.config();
    let settings = Arc::new(WorkerSettings::from(&config.worker));
    // One document needs one worker
    let pool = WorkerPool::start(app.launcher(), settings, 1, 1).await?;

    let cache = DiagnosticCache::new();
    cache.open(&uri).await;
    cache
        .update(&uri, DiagnosticSource::Realtime, pool.analyze(&text, &uri).await)
        .await;

    let mut deep_error = None;
    if args.deep {
        match app.deep_analyzer()?.analyze(&uri, &text).await {
            Ok(diagnostics) => {
                cache.update(&uri, DiagnosticSource::Deep, diagnostics).await;
            }
            Err(AnalyzerError::Disabled) => {
                deep_error = Some("Deep analysis is disabled in config".to_string());
            }
            Err(e) => {
                tracing::warn!("Deep analysis failed: {}", e);
                deep_error = Some(e.to_string());
            }
        }
    }

    let health = if verbose {
        Some(pool.health().await)
    } else {
        None
    };
    pool.shutdown().await;

    let mut diagnostics = cache.merged(&uri).await;
    if let Some(min) = args.severity {
        // Lower LSP value means more severe
        diagnostics.retain(|d| d.severity() <= min);
    }

    ctx.print_success_flat(AnalyzeResponse {
        file: ctx.relative_path(&path),
        count: diagnostics.len(),
        diagnostics,
        deep_error,
        health,
    });

    Ok(())
}
