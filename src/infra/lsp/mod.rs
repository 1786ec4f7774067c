//! LSP Infrastructure for Sculptor
//!
//! Provides the worker side of the diagnostics pipeline:
//! - JSON-RPC 2.0 protocol types
//! - Async message transport with Content-Length framing
//! - Long-lived analysis engine processes
//! - Round-robin worker pool with full restart on failure

pub mod pool;
pub mod protocol;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use pool::{PoolHealth, WorkerHealth, WorkerPool};
pub use transport::{FrameReader, FrameWriter};
pub use worker::{CommandLauncher, Worker, WorkerLauncher, WorkerSettings};
