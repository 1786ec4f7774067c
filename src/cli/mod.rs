//! CLI module for Sculptor
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;
pub mod output;

pub use output::OutputContext;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{analyze::AnalyzeArgs, config::ConfigArgs, serve::ServeArgs};

const LONG_ABOUT: &str = r#"
Sculptor - realtime diagnostics for editors

Sculptor keeps a pool of language-analysis workers warm, debounces edits,
and merges fast realtime diagnostics with slower deep static analysis into
one list per document.

QUICK START:
  1. Write a project config:  sculptor config init
  2. Attach an editor:        sculptor serve
  3. Check a single file:     sculptor analyze notebook.py --deep

Logs go to stderr; use -v or RUST_LOG=sculptor=debug for more detail.
"#;

/// Sculptor - realtime diagnostics for editors
#[derive(Parser, Debug)]
#[command(name = "sculptor")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'sculptor <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Use this config file instead of the global and project files
    #[arg(long, global = true, env = "SCULPTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the LSP server over stdio
    Serve(ServeArgs),

    /// Analyze one file and print its diagnostics
    Analyze(AnalyzeArgs),

    /// Configuration management
    Config(ConfigArgs),
}
