//! Data models for Sculptor
//!
//! Contains core type definitions used throughout the application.

pub mod config;
pub mod diagnostic;
pub mod lsp;

// Re-export commonly used types
pub use config::SculptorConfig;
pub use diagnostic::{Diagnostic, DiagnosticSeverity, DiagnosticSource};
pub use lsp::{Position, Range};
