//! Sculptor - realtime diagnostics for editors
//!
//! Keeps a warm pool of language-analysis workers behind an LSP server and
//! merges their results with deep static analysis on save.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sculptor::app::App;
use sculptor::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // stdout carries protocol frames and JSON output, so logs go to stderr
    // Use RUST_LOG=sculptor=debug for verbose output
    let default_filter = if cli.verbose {
        "sculptor=debug"
    } else {
        "sculptor=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!(
                r#"{{"success":false,"error":"Failed to create runtime: {}"}}"#,
                e
            );
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(async_main(cli));

    if let Err(e) = result {
        let response = serde_json::json!({
            "success": false,
            "error": format!("{:#}", e)
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| format!(r#"{{"success":false,"error":"{}"}}"#, e))
        );
        std::process::exit(2);
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let app = App::new(cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize: {:#}", e))?;

    execute_command(cli.command, &app, cli.verbose).await
}

async fn execute_command(command: Commands, app: &App, verbose: bool) -> anyhow::Result<()> {
    use sculptor::cli::commands;

    match command {
        Commands::Serve(args) => commands::serve::execute(args, app).await,
        Commands::Analyze(args) => commands::analyze::execute(args, app, verbose).await,
        Commands::Config(args) => commands::config::execute(args, app).await,
    }
}
