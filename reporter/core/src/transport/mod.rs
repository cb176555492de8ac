//! Transport Layer for Report Delivery
//!
//! A single client connection over a Unix domain stream socket:
//! - [`Connection`]: lifecycle and I/O state machine
//! - [`ConnectionObserver`]: side channel for transitions and errors
//! - [`TransportError`]: usage and fatal I/O errors
//!
//! # Design Philosophy
//!
//! The connection owns exactly one socket and does no scheduling of its own.
//! A driver decides when to read, when to write and when to give up. Nothing
//! here spawns threads or takes locks.
//!
//! # Socket Location
//!
//! Default: `$XDG_RUNTIME_DIR/reporter/collector.sock`
//! Fallback: `/tmp/reporter-$UID/collector.sock`

pub mod connection;
pub mod error;
pub mod observer;
pub mod options;
mod socket;

use std::path::PathBuf;

// Re-exports for convenience
pub use connection::{
    ConnKey, Connection, ConnectionState, ReadOutcome, SendPolicy, DEFAULT_SEND_ATTEMPTS,
    DEFAULT_SEND_RETRY_INTERVAL,
};
pub use error::{is_transient, TransportError};
pub use observer::{
    ConnectionEvent, ConnectionObserver, EventKind, RecordingObserver, TracingObserver,
};
pub use options::{SocketOption, SOCKET_BUFFER_SIZE};

/// Get the default collector socket path
///
/// Uses `XDG_RUNTIME_DIR` if available, otherwise `/tmp/reporter-$UID/`.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("reporter")
            .join("collector.sock")
    } else {
        // SAFETY: getuid(2) cannot fail and takes no arguments.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/reporter-{uid}/collector.sock"))
    }
}
