//! Infrastructure layer for Sculptor
//!
//! Contains the worker process plumbing and the deep-analysis HTTP client.

pub mod analyzer;
pub mod lsp;
