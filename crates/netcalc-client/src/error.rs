//! Client error types.

use std::time::Duration;

use netcalc_core::ProtocolError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open a connection to the server.
    #[error("cannot connect to {address}: {reason}")]
    Connect {
        /// Address that was dialed.
        address: String,
        /// Description of the failure.
        reason: String,
    },

    /// The connection broke while sending or awaiting a response.
    #[error("transport error: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// The server sent a line that does not decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The reconnect backoff reached its ceiling.
    #[error("giving up after {attempts} connection attempts (last delay {last_delay:?})")]
    RetriesExhausted {
        /// Connection attempts made, including the first.
        attempts: u32,
        /// Longest delay waited before giving up.
        last_delay: Duration,
    },

    /// The event is not valid in the current state.
    #[error("invalid transition: {event} while {state}")]
    InvalidTransition {
        /// State the session was in.
        state: &'static str,
        /// Event that was rejected.
        event: &'static str,
    },

    /// Local terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors end the client.
    /// Transient errors are recovered by reconnecting.
    pub fn is_fatal(&self) -> bool {
        match self {
            // Fatal: nothing left to retry, or a bug
            Self::RetriesExhausted { .. } | Self::InvalidTransition { .. } | Self::Io(_) => true,

            // Transient: reconnect and resend
            Self::Connect { .. } | Self::Transport { .. } | Self::Protocol(_) => false,
        }
    }
}
