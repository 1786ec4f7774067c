//! Config command implementation

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::app::App;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init {
        /// Initialize global config (~/.config/sculptor)
        #[arg(long)]
        global: bool,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration (files, then environment)
    Show,

    /// Show config file paths
    Path {
        /// Show global config path only
        #[arg(long)]
        global: bool,
    },
}

#[derive(Serialize)]
struct ConfigInitResponse {
    status: &'static str,
    path: String,
    level: &'static str,
}

#[derive(Serialize)]
struct ConfigShowResponse {
    source: String,
    config: serde_json::Value,
}

#[derive(Serialize)]
struct ConfigPathEntry {
    level: &'static str,
    path: String,
    exists: bool,
}

#[derive(Serialize)]
struct ConfigPathResponse {
    paths: Vec<ConfigPathEntry>,
}

pub async fn execute(args: ConfigArgs, app: &App) -> Result<()> {
    let ctx = &app.output;

    match args.command {
        ConfigCommand::Init { global, force } => {
            let level = if global { "global" } else { "project" };
            match app.config_service.init(global, force).await {
                Ok(path) => ctx.print_success_flat(ConfigInitResponse {
                    status: "created",
                    path: display_path(app, &path, global),
                    level,
                }),
                Err(e) => ctx.print_error(&e.to_string()),
            }
        }

        ConfigCommand::Show => {
            let source = match app.config_path() {
                Some(path) => path.display().to_string(),
                None => "merged".to_string(),
            };
            ctx.print_success_flat(ConfigShowResponse {
                source,
                config: serde_json::to_value(app.config())?,
            });
        }

        ConfigCommand::Path { global } => {
            let mut paths = Vec::new();
            if let Some(explicit) = app.config_path() {
                paths.push(ConfigPathEntry {
                    level: "explicit",
                    path: explicit.display().to_string(),
                    exists: explicit.exists(),
                });
            }
            let levels: &[bool] = if global { &[true] } else { &[true, false] };
            for &is_global in levels {
                let path = app.config_service.config_path(is_global);
                paths.push(ConfigPathEntry {
                    level: if is_global { "global" } else { "project" },
                    path: display_path(app, &path, is_global),
                    exists: path.exists(),
                });
            }
            ctx.print_success_flat(ConfigPathResponse { paths });
        }
    }

    Ok(())
}

fn display_path(app: &App, path: &std::path::Path, global: bool) -> String {
    if global {
        path.display().to_string()
    } else {
        app.output.relative_path(path)
    }
}
