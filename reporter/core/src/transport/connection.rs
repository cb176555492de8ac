//! Report Connection
//!
//! Client side of a Unix domain stream socket used to ship report payloads
//! to a local collector. The connection is driven from outside: a driver
//! calls [`Connection::start`] once, then [`Connection::read`] and
//! [`Connection::write`] from its own loop, and [`Connection::close`] when
//! it is done or when either call reports a dead peer.
//!
//! # State machine
//!
//! ```text
//!              start ok                 read: EOF / fatal
//!  Unstarted ───────────► Connected ─────────────────────► Disconnected
//!      │                      │                                 │
//!      │ start fails          │ close                           │ close
//!      ▼                      ▼                                 ▼
//!  StartFailed ──close──►  Closed  ◄────────────────────────────┘
//! ```
//!
//! `start` succeeds at most once per instance. Restarting means building a
//! new `Connection`.
//!
//! # Blocking
//!
//! After `start` the socket is non-blocking. `read` issues a single `recv`
//! and returns. `write` retries on back-pressure by sleeping the calling
//! thread, bounded by [`SendPolicy::max_stall`].

use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use super::error::{is_transient, TransportError};
use super::observer::{ConnectionEvent, ConnectionObserver, TracingObserver};
use super::options::{apply_steady_state, SocketOption, SOCKET_BUFFER_SIZE};
use super::socket::{unix_address, UnixSocket};

/// Caller-assigned connection identifier, used for correlation only
pub type ConnKey = i32;

/// Default number of send attempts per `write`
pub const DEFAULT_SEND_ATTEMPTS: u32 = 10;

/// Default pause between send attempts
pub const DEFAULT_SEND_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Retry budget for `write`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendPolicy {
    attempts: u32,
    retry_interval: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_SEND_ATTEMPTS,
            retry_interval: DEFAULT_SEND_RETRY_INTERVAL,
        }
    }
}

impl SendPolicy {
    /// Create a policy; `attempts` is clamped to at least one
    #[must_use]
    pub fn new(attempts: u32, retry_interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            retry_interval,
        }
    }

    /// Maximum number of `send` calls per `write`
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleep between attempts
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Upper bound on the time a single `write` spends sleeping
    #[must_use]
    pub fn max_stall(&self) -> Duration {
        self.retry_interval.saturating_mul(self.attempts)
    }
}

/// Lifecycle state of a [`Connection`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, no syscalls made yet
    Unstarted,
    /// `start` failed; the socket was released
    StartFailed,
    /// Connected and usable
    Connected,
    /// Peer went away; the socket is held until `close`
    Disconnected,
    /// Closed; terminal
    Closed,
}

impl ConnectionState {
    /// Whether `start` has been called on this instance
    #[must_use]
    pub fn is_started(self) -> bool {
        !matches!(self, Self::Unstarted)
    }
}

/// Result of a single [`Connection::read`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Not connected; nothing was read
    NotConnected,
    /// No data available right now
    Idle,
    /// Bytes arrived and are available through [`Connection::received`]
    Received(usize),
    /// The peer shut down its side
    PeerClosed,
    /// `recv` failed with a non-transient error
    Failed(std::io::ErrorKind),
}

impl ReadOutcome {
    /// True when this read observed the end of the connection
    #[must_use]
    pub fn is_disconnected(self) -> bool {
        matches!(self, Self::PeerClosed | Self::Failed(_))
    }
}

/// A single client connection to a Unix domain socket
pub struct Connection {
    key: ConnKey,
    address: PathBuf,
    state: ConnectionState,
    socket: Option<UnixSocket>,
    policy: SendPolicy,
    last_send_time: Option<Instant>,
    last_receive_time: Option<Instant>,
    receive_buffer: Box<[u8]>,
    received_len: usize,
    applied_options: Vec<SocketOption>,
    observer: Box<dyn ConnectionObserver>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("last_send_time", &self.last_send_time)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection; no syscalls are made until [`start`](Self::start)
    pub fn new(key: ConnKey, address: impl Into<PathBuf>) -> Self {
        Self::with_policy(key, address, SendPolicy::default())
    }

    /// Create a connection with a custom send retry budget
    pub fn with_policy(key: ConnKey, address: impl Into<PathBuf>, policy: SendPolicy) -> Self {
        Self {
            key,
            address: address.into(),
            state: ConnectionState::Unstarted,
            socket: None,
            policy,
            last_send_time: None,
            last_receive_time: None,
            receive_buffer: vec![0u8; SOCKET_BUFFER_SIZE].into_boxed_slice(),
            received_len: 0,
            applied_options: Vec::new(),
            observer: Box::new(TracingObserver),
        }
    }

    /// Replace the event observer
    #[must_use]
    pub fn with_observer(mut self, observer: impl ConnectionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    fn notify(&self, event: &ConnectionEvent<'_>) {
        self.observer.on_event(self.key, &self.address, event);
    }

    /// Open the socket and connect to the peer
    ///
    /// `connect_timeout` bounds the blocking connect; `io_timeout` becomes
    /// the steady-state send/receive timeout. A zero duration means no
    /// timeout. On success the socket is switched to non-blocking mode.
    ///
    /// # Errors
    ///
    /// - [`TransportError::AlreadyStarted`] if `start` was called before
    /// - [`TransportError::InvalidAddress`] if the path is not a valid socket address
    /// - [`TransportError::ConnectionFailed`] if the socket cannot be opened or connected
    pub fn start(
        &mut self,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<(), TransportError> {
        if self.state.is_started() {
            self.notify(&ConnectionEvent::StartRejected);
            return Err(TransportError::AlreadyStarted { key: self.key });
        }

        self.notify(&ConnectionEvent::Starting);

        let addr = match unix_address(&self.address) {
            Ok(addr) => addr,
            Err(e) => {
                let error = std::io::Error::new(std::io::ErrorKind::InvalidInput, e.reason());
                self.notify(&ConnectionEvent::ConnectFailed { error: &error });
                self.state = ConnectionState::StartFailed;
                return Err(TransportError::InvalidAddress {
                    path: self.address.clone(),
                    reason: e.reason(),
                });
            }
        };

        let socket = match UnixSocket::open() {
            Ok(socket) => socket,
            Err(error) => return Err(self.fail_start(error)),
        };

        if let Err(error) = socket.set_send_timeout(connect_timeout) {
            self.notify(&ConnectionEvent::OptionFailed {
                option: SocketOption::ConnectTimeout,
                error: &error,
            });
        }

        if let Err(error) = socket.connect(&addr) {
            // Dropping `socket` here closes the descriptor.
            drop(socket);
            return Err(self.fail_start(error));
        }

        self.last_send_time = Some(Instant::now());

        let report = apply_steady_state(&socket, io_timeout);
        for (option, error) in &report.failed {
            self.notify(&ConnectionEvent::OptionFailed {
                option: *option,
                error,
            });
        }
        self.applied_options = report.applied;

        match socket.set_nonblocking(true) {
            Ok(()) => self.applied_options.push(SocketOption::NonBlocking),
            Err(error) => self.notify(&ConnectionEvent::OptionFailed {
                option: SocketOption::NonBlocking,
                error: &error,
            }),
        }

        self.socket = Some(socket);
        self.state = ConnectionState::Connected;
        self.notify(&ConnectionEvent::Connected {
            applied: &self.applied_options,
        });
        Ok(())
    }

    fn fail_start(&mut self, error: std::io::Error) -> TransportError {
        self.notify(&ConnectionEvent::ConnectFailed { error: &error });
        self.state = ConnectionState::StartFailed;
        TransportError::ConnectionFailed {
            path: self.address.clone(),
            source: error,
        }
    }

    /// Poll the socket once for inbound bytes
    ///
    /// Never blocks and never retries. Inbound bytes are not interpreted;
    /// they stay available through [`received`](Self::received) until the
    /// next read. A `PeerClosed` or `Failed` outcome clears the connected
    /// flag but keeps the socket until [`close`](Self::close).
    pub fn read(&mut self, now: Instant) -> ReadOutcome {
        if self.state != ConnectionState::Connected {
            return ReadOutcome::NotConnected;
        }
        let Some(socket) = self.socket.as_ref() else {
            return ReadOutcome::NotConnected;
        };

        self.received_len = 0;
        match socket.recv(&mut self.receive_buffer) {
            Ok(0) => {
                self.state = ConnectionState::Disconnected;
                self.notify(&ConnectionEvent::PeerClosed);
                ReadOutcome::PeerClosed
            }
            Ok(n) => {
                self.received_len = n;
                self.last_receive_time = Some(now);
                ReadOutcome::Received(n)
            }
            Err(e) if is_transient(&e) => ReadOutcome::Idle,
            Err(error) => {
                self.state = ConnectionState::Disconnected;
                self.notify(&ConnectionEvent::ReadFailed { error: &error });
                ReadOutcome::Failed(error.kind())
            }
        }
    }

    /// Write a whole payload, retrying on back-pressure
    ///
    /// Sends the unsent remainder up to [`SendPolicy::attempts`] times,
    /// sleeping [`SendPolicy::retry_interval`] between attempts that did not
    /// finish the payload. `last_send_time` becomes `now` whenever any bytes
    /// are accepted. A failed write leaves the connection open; closing it
    /// is the caller's decision.
    ///
    /// # Errors
    ///
    /// - [`TransportError::EmptyPayload`] for an empty slice (no syscall)
    /// - [`TransportError::NotConnected`] when not connected (no syscall)
    /// - [`TransportError::SendFailed`] on a non-transient send error
    /// - [`TransportError::RetryExhausted`] when the budget runs out
    pub fn write(&mut self, payload: &[u8], now: Instant) -> Result<(), TransportError> {
        if payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected { key: self.key });
        }
        let Some(socket) = self.socket.as_ref() else {
            return Err(TransportError::NotConnected { key: self.key });
        };

        let total = payload.len();
        let attempts = self.policy.attempts;
        let mut sent = 0;

        for attempt in 1..=attempts {
            match socket.send(&payload[sent..]) {
                Ok(n) if n > 0 => {
                    sent += n;
                    self.last_send_time = Some(now);
                    if sent == total {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) if is_transient(&e) => {}
                Err(error) => {
                    self.notify(&ConnectionEvent::WriteFailed {
                        error: &error,
                        sent,
                        total,
                    });
                    return Err(TransportError::SendFailed {
                        sent,
                        total,
                        source: error,
                    });
                }
            }

            if attempt < attempts {
                thread::sleep(self.policy.retry_interval);
            }
        }

        self.notify(&ConnectionEvent::RetryExhausted {
            attempts,
            sent,
            total,
        });
        Err(TransportError::RetryExhausted {
            attempts,
            sent,
            total,
        })
    }

    /// Release the socket and mark the connection closed
    ///
    /// Idempotent: a never-started or already closed connection is left
    /// untouched.
    pub fn close(&mut self, reason: &str) {
        match self.state {
            ConnectionState::Unstarted | ConnectionState::Closed => return,
            ConnectionState::StartFailed
            | ConnectionState::Connected
            | ConnectionState::Disconnected => {}
        }

        // Taking the socket out guarantees the descriptor is closed once.
        drop(self.socket.take());
        self.state = ConnectionState::Closed;
        self.received_len = 0;
        self.notify(&ConnectionEvent::Closed { reason });
    }

    /// Connection key
    #[must_use]
    pub fn key(&self) -> ConnKey {
        self.key
    }

    /// Target socket path
    #[must_use]
    pub fn address(&self) -> &Path {
        &self.address
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is usable for reads and writes
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Send retry budget in effect
    #[must_use]
    pub fn send_policy(&self) -> SendPolicy {
        self.policy
    }

    /// Time of the connect or of the last write that moved bytes
    #[must_use]
    pub fn last_send_time(&self) -> Option<Instant> {
        self.last_send_time
    }

    /// Time of the last read that returned bytes
    #[must_use]
    pub fn last_receive_time(&self) -> Option<Instant> {
        self.last_receive_time
    }

    /// How long nothing has been sent, measured against `now`
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_send_time
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// Bytes delivered by the most recent read
    #[must_use]
    pub fn received(&self) -> &[u8] {
        &self.receive_buffer[..self.received_len]
    }

    /// Options that were applied successfully during `start`
    #[must_use]
    pub fn applied_options(&self) -> &[SocketOption] {
        &self.applied_options
    }

    /// Raw descriptor for readiness polling, while the socket is held
    #[must_use]
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(AsRawFd::as_raw_fd)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close("connection dropped");
    }
}
