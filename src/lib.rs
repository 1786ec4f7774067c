//! Sculptor - realtime diagnostics library
//!
//! Runs a pool of long-lived language-analysis workers, debounces edits,
//! and merges realtime and deep diagnostics per document for an editor
//! speaking LSP over stdio.

pub mod app;
pub mod cli;
pub mod error;
pub mod infra;
pub mod models;
pub mod server;
pub mod services;

pub use error::{SculptorError, SculptorResult};
