//! Transport Errors
//!
//! Error taxonomy for the report connection:
//! - Usage errors are rejected before any I/O syscall
//! - Transient conditions never surface here (they are retried or ignored)
//! - Fatal conditions carry the underlying `io::Error`

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::connection::ConnKey;

/// Errors returned by [`Connection`](super::Connection) operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// `start` was called on an instance that was already started
    #[error("connection {key} was already started")]
    AlreadyStarted {
        /// Key of the rejected connection
        key: ConnKey,
    },

    /// `write` was called with an empty payload
    #[error("refusing to write an empty payload")]
    EmptyPayload,

    /// The operation needs a connected socket
    #[error("connection {key} is not connected")]
    NotConnected {
        /// Key of the connection
        key: ConnKey,
    },

    /// The socket path cannot be expressed as a Unix socket address
    #[error("invalid socket path {path:?}: {reason}")]
    InvalidAddress {
        /// Offending path
        path: PathBuf,
        /// Why the path was rejected
        reason: &'static str,
    },

    /// Opening or connecting the socket failed
    #[error("failed to connect to {path:?}: {source}")]
    ConnectionFailed {
        /// Target socket path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A send failed with a non-transient error
    #[error("send failed after {sent} of {total} bytes: {source}")]
    SendFailed {
        /// Bytes delivered before the failure
        sent: usize,
        /// Payload length
        total: usize,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The send retry budget ran out before the payload was fully written
    #[error("send retry budget of {attempts} attempts exhausted after {sent} of {total} bytes")]
    RetryExhausted {
        /// Attempts consumed
        attempts: u32,
        /// Bytes delivered before giving up
        sent: usize,
        /// Payload length
        total: usize,
    },
}

impl TransportError {
    /// True for errors raised before any I/O syscall was attempted
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted { .. }
                | Self::EmptyPayload
                | Self::NotConnected { .. }
                | Self::InvalidAddress { .. }
        )
    }

    /// Bytes delivered to the kernel before the error, if a send was attempted
    #[must_use]
    pub fn bytes_sent(&self) -> Option<usize> {
        match self {
            Self::SendFailed { sent, .. } | Self::RetryExhausted { sent, .. } => Some(*sent),
            _ => None,
        }
    }
}

/// Whether an I/O error means "try again later" rather than failure
///
/// Would-block, interrupted and in-progress are transient; everything else
/// (including `EPIPE` and `ECONNRESET`) is fatal.
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) || err.raw_os_error() == Some(libc::EINPROGRESS)
}
