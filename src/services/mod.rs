//! Service layer for Sculptor

pub mod cache;
pub mod config;
pub mod debounce;
pub mod orchestrator;

pub use cache::DiagnosticCache;
pub use config::{ConfigService, DefaultConfigService};
pub use debounce::Debouncer;
pub use orchestrator::{DiagnosticPublisher, Orchestrator};
