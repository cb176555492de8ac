//! Connection Observer
//!
//! Side channel for state transitions and errors. The connection never logs
//! directly; it reports [`ConnectionEvent`]s to an observer at fixed points
//! and carries on with its own control flow.
//!
//! [`TracingObserver`] is the default and logs through `tracing`.
//! [`RecordingObserver`] keeps events in memory for assertions and
//! diagnostics.

use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::ConnKey;
use super::options::SocketOption;

/// Something that happened to a connection
#[derive(Debug)]
pub enum ConnectionEvent<'a> {
    /// `start` is about to open and connect the socket
    Starting,
    /// Connect succeeded and the socket was tuned
    Connected {
        /// Options the kernel accepted
        applied: &'a [SocketOption],
    },
    /// Opening or connecting the socket failed
    ConnectFailed {
        /// Underlying OS error
        error: &'a io::Error,
    },
    /// `start` was called on an already started instance
    StartRejected,
    /// A socket option could not be applied (non-fatal)
    OptionFailed {
        /// Which option
        option: SocketOption,
        /// Underlying OS error
        error: &'a io::Error,
    },
    /// The peer shut down its side (`recv` returned 0)
    PeerClosed,
    /// `recv` failed with a non-transient error
    ReadFailed {
        /// Underlying OS error
        error: &'a io::Error,
    },
    /// `send` failed with a non-transient error
    WriteFailed {
        /// Underlying OS error
        error: &'a io::Error,
        /// Bytes delivered before the failure
        sent: usize,
        /// Payload length
        total: usize,
    },
    /// The send retry budget ran out
    RetryExhausted {
        /// Attempts consumed
        attempts: u32,
        /// Bytes delivered before giving up
        sent: usize,
        /// Payload length
        total: usize,
    },
    /// The connection was closed
    Closed {
        /// Caller-supplied reason
        reason: &'a str,
    },
}

impl ConnectionEvent<'_> {
    /// Owned, comparable summary of the event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Starting => EventKind::Starting,
            Self::Connected { .. } => EventKind::Connected,
            Self::ConnectFailed { .. } => EventKind::ConnectFailed,
            Self::StartRejected => EventKind::StartRejected,
            Self::OptionFailed { option, .. } => EventKind::OptionFailed(*option),
            Self::PeerClosed => EventKind::PeerClosed,
            Self::ReadFailed { .. } => EventKind::ReadFailed,
            Self::WriteFailed { .. } => EventKind::WriteFailed,
            Self::RetryExhausted { .. } => EventKind::RetryExhausted,
            Self::Closed { reason } => EventKind::Closed((*reason).to_string()),
        }
    }
}

/// Owned discriminant of a [`ConnectionEvent`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// See [`ConnectionEvent::Starting`]
    Starting,
    /// See [`ConnectionEvent::Connected`]
    Connected,
    /// See [`ConnectionEvent::ConnectFailed`]
    ConnectFailed,
    /// See [`ConnectionEvent::StartRejected`]
    StartRejected,
    /// See [`ConnectionEvent::OptionFailed`]
    OptionFailed(SocketOption),
    /// See [`ConnectionEvent::PeerClosed`]
    PeerClosed,
    /// See [`ConnectionEvent::ReadFailed`]
    ReadFailed,
    /// See [`ConnectionEvent::WriteFailed`]
    WriteFailed,
    /// See [`ConnectionEvent::RetryExhausted`]
    RetryExhausted,
    /// See [`ConnectionEvent::Closed`]
    Closed(String),
}

/// Receives connection events
pub trait ConnectionObserver: Send {
    /// Called at every transition point of the connection
    fn on_event(&self, key: ConnKey, address: &Path, event: &ConnectionEvent<'_>);
}

/// Logs events through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_event(&self, key: ConnKey, address: &Path, event: &ConnectionEvent<'_>) {
        match event {
            ConnectionEvent::Starting => {
                tracing::debug!(key, path = ?address, "Starting connection");
            }
            ConnectionEvent::Connected { applied } => {
                tracing::info!(key, path = ?address, options = applied.len(), "Connected");
            }
            ConnectionEvent::ConnectFailed { error } => {
                tracing::warn!(key, path = ?address, error = %error, "Failed to connect");
            }
            ConnectionEvent::StartRejected => {
                tracing::warn!(key, path = ?address, "Connection already started");
            }
            ConnectionEvent::OptionFailed { option, error } => {
                tracing::debug!(key, path = ?address, %option, error = %error, "Socket option not applied");
            }
            ConnectionEvent::PeerClosed => {
                tracing::info!(key, path = ?address, "Connection closed by peer");
            }
            ConnectionEvent::ReadFailed { error } => {
                tracing::warn!(key, path = ?address, error = %error, "Read error");
            }
            ConnectionEvent::WriteFailed { error, sent, total } => {
                tracing::warn!(key, path = ?address, error = %error, sent, total, "Write error");
            }
            ConnectionEvent::RetryExhausted {
                attempts,
                sent,
                total,
            } => {
                tracing::warn!(key, path = ?address, attempts, sent, total, "Send retry budget exhausted");
            }
            ConnectionEvent::Closed { reason } => {
                tracing::info!(key, path = ?address, reason, "Connection closed");
            }
        }
    }
}

/// Collects event kinds in memory
///
/// Clones share the same event list, so one clone can be handed to a
/// connection while another is kept for inspection.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<EventKind>>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<EventKind> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `kind`
    #[must_use]
    pub fn count(&self, kind: &EventKind) -> usize {
        self.events.lock().iter().filter(|e| *e == kind).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_event(&self, _key: ConnKey, _address: &Path, event: &ConnectionEvent<'_>) {
        self.events.lock().push(event.kind());
    }
}
