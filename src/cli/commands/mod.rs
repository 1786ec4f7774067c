//! Command implementations for Sculptor
//!
//! Each command is implemented in its own module.

pub mod analyze;
pub mod config;
pub mod serve;
