//! Server error types.

use std::fmt;

use netcalc_core::logging::LoggingError;

/// Errors that stop the server from starting or running.
///
/// Per-request and per-session failures never surface here: they are
/// answered on the wire or end only the affected worker.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error
    Config(String),

    /// Transport/network error
    Transport(String),

    /// Logging could not be installed
    Logging(LoggingError),

    /// Internal error
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Logging(err) => write!(f, "logging error: {}", err),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoggingError> for ServerError {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
