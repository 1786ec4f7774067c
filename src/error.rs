//! Error types for Sculptor

use thiserror::Error;

pub type SculptorResult<T> = std::result::Result<T, SculptorError>;

#[derive(Debug, Error)]
pub enum SculptorError {
    #[error("{0}")]
    Lsp(#[from] LspError),

    #[error("{0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while reading or writing `Content-Length` framed messages
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Stream closed while reading {0}")]
    Closed(&'static str),

    #[error("Invalid Content-Length header: {0}")]
    InvalidHeader(String),

    #[error("Malformed message body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FramingError {
    /// Whether the stream can no longer be trusted and the peer must be treated as dead
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidHeader(_) | Self::InvalidBody(_) => false,
            Self::Closed(_) | Self::FrameTooLarge { .. } | Self::Io(_) => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LspError {
    #[error("Failed to start worker: {0}")]
    WorkerStart(String),

    #[error("Worker {slot} terminated unexpectedly")]
    WorkerTerminated { slot: usize },

    #[error("Worker {slot} did not publish diagnostics within {timeout_ms}ms")]
    Timeout { slot: usize, timeout_ms: u64 },

    #[error("Worker pool is shut down")]
    PoolShutdown,

    #[error("Worker pool has no live workers")]
    PoolEmpty,

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LspError {
    /// Transport-level failures that invalidate the whole pool
    pub fn needs_restart(&self) -> bool {
        match self {
            Self::WorkerTerminated { .. } | Self::Timeout { .. } | Self::PoolEmpty | Self::Io(_) => {
                true
            }
            Self::Framing(e) => e.is_fatal(),
            Self::WorkerStart(_) | Self::PoolShutdown | Self::Json(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Deep analysis is disabled")]
    Disabled,

    #[error("Deep analysis request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deep analyzer returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Deep analyzer returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_stream_is_fatal() {
        let err = FramingError::Closed("header");
        assert!(err.is_fatal());
        assert!(LspError::from(err).needs_restart());
    }

    #[test]
    fn test_malformed_body_is_not_fatal() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = FramingError::InvalidBody(json_err);
        assert!(!err.is_fatal());
        assert!(!LspError::from(err).needs_restart());
    }

    #[test]
    fn test_worker_failures_need_restart() {
        assert!(LspError::WorkerTerminated { slot: 1 }.needs_restart());
        assert!(
            LspError::Timeout {
                slot: 0,
                timeout_ms: 100
            }
            .needs_restart()
        );
        assert!(!LspError::PoolShutdown.needs_restart());
        assert!(!LspError::WorkerStart("pylsp: not found".to_string()).needs_restart());
    }

    #[test]
    fn test_error_messages() {
        let err = LspError::Timeout {
            slot: 2,
            timeout_ms: 500,
        };
        assert_eq!(
            err.to_string(),
            "Worker 2 did not publish diagnostics within 500ms"
        );

        let err = ConfigError::InvalidValue {
            key: "worker.pool_size".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert!(err.to_string().contains("worker.pool_size"));
    }
}
