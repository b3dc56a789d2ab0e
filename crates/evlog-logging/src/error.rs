//! Error types for evlog-logging

use thiserror::Error;

/// Errors raised while installing the logging subscriber
#[derive(Debug, Error)]
pub enum LogError {
    /// Log directory or file could not be created
    #[error("I/O error: {0}")]
    Io(String),

    /// Rolling file appender rejected its configuration
    #[error("Failed to create log file appender: {0}")]
    Appender(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::Io(err.to_string())
    }
}

impl From<tracing_appender::rolling::InitError> for LogError {
    fn from(err: tracing_appender::rolling::InitError) -> Self {
        LogError::Appender(err.to_string())
    }
}

impl From<tracing_subscriber::util::TryInitError> for LogError {
    fn from(err: tracing_subscriber::util::TryInitError) -> Self {
        LogError::AlreadyInitialized(err.to_string())
    }
}
