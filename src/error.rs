//! Error types for ExamGuard.
//!
//! None of these escape the monitor loop: server and platform errors are
//! turned into outcomes and log lines there. They surface directly only
//! from configuration loading, replay parsing and the collaborator clients.

use thiserror::Error;

/// Errors from the exam server collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerError {
    /// Request did not complete (connection refused, reset, DNS)
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("rejected by server ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Body or reason phrase
        message: String,
    },

    /// Server answered with a body we could not read
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Errors from the platform hosting the exam surface
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// Platform refused fullscreen (e.g. no user gesture)
    #[error("fullscreen request denied: {0}")]
    FullscreenDenied(String),

    /// No shell is attached to carry the command
    #[error("platform unavailable")]
    Unavailable,
}

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors reading a replay script
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: cannot parse '{text}'")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Offending line
        text: String,
    },

    #[error("line {line}: time {at_ms}ms goes backwards")]
    OutOfOrder {
        line: usize,
        at_ms: u64,
    },
}
