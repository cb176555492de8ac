//! Delivery Loop
//!
//! Owns one started [`Connection`] and sequences reads and writes on it.
//! Payloads arrive over a channel from a producer thread so the loop never
//! blocks on input; every tick it polls the socket once, so a peer that goes
//! away is noticed even when nothing is being sent.
//!
//! ```text
//! stdin / --message ──► mpsc ──► recv_timeout(poll) ──► write(payload + '\n')
//!                                       │
//!                                       └──────────────► read(now) every tick
//! ```

use std::fmt;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use reporter_core::{Connection, ReadOutcome};

/// Loop timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Longest wait for the next payload before polling the socket again
    pub poll_interval: Duration,
    /// Close after this long without a successful send (None = never)
    pub idle_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            idle_timeout: None,
        }
    }
}

/// Why the loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The producer finished and every payload was written
    InputFinished,
    /// Nothing was sent for longer than the idle timeout
    IdleTimeout,
    /// SIGINT or SIGTERM
    Shutdown,
    /// The collector closed the connection or a read failed
    PeerClosed,
    /// A write failed or ran out of retries
    WriteFailed,
}

impl StopReason {
    /// Short label, also used as the close reason
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputFinished => "input finished",
            Self::IdleTimeout => "idle timeout",
            Self::Shutdown => "shutdown requested",
            Self::PeerClosed => "peer closed",
            Self::WriteFailed => "write failed",
        }
    }

    /// Whether delivery was cut short by the transport
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::PeerClosed | Self::WriteFailed)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters reported when the loop ends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverStats {
    /// Payloads written in full
    pub payloads: usize,
    /// Bytes written, newlines included
    pub bytes: usize,
    /// Reads that returned data
    pub reads: usize,
    /// Bytes received from the collector
    pub received_bytes: usize,
    /// Why the loop ended
    pub stop: StopReason,
}

/// Runs the delivery loop over one connection
#[derive(Debug)]
pub struct Driver {
    conn: Connection,
    config: DriverConfig,
}

impl Driver {
    /// Wrap a started connection
    pub fn new(conn: Connection, config: DriverConfig) -> Self {
        Self { conn, config }
    }

    /// Deliver payloads until input ends, the peer goes away, the idle
    /// timeout fires or `shutdown` is raised. The connection is closed on
    /// every exit path.
    pub fn run(mut self, payloads: &Receiver<String>, shutdown: &AtomicBool) -> DriverStats {
        let mut payload_count = 0;
        let mut bytes = 0;
        let mut reads = 0;
        let mut received_bytes = 0;

        let stop = loop {
            if shutdown.load(Ordering::Relaxed) {
                break StopReason::Shutdown;
            }

            let next = payloads.recv_timeout(self.config.poll_interval);
            let now = Instant::now();

            match next {
                Ok(line) => {
                    let mut payload = line.into_bytes();
                    payload.push(b'\n');
                    if let Err(e) = self.conn.write(&payload, now) {
                        warn!(key = self.conn.key(), error = %e, "Failed to deliver payload");
                        break StopReason::WriteFailed;
                    }
                    payload_count += 1;
                    bytes += payload.len();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(limit) = self.config.idle_timeout {
                        if self.conn.idle_for(now).is_some_and(|idle| idle >= limit) {
                            break StopReason::IdleTimeout;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break StopReason::InputFinished,
            }

            match self.conn.read(now) {
                ReadOutcome::Received(n) => {
                    reads += 1;
                    received_bytes += n;
                    debug!(key = self.conn.key(), bytes = n, "Collector sent data");
                }
                outcome if outcome.is_disconnected() => break StopReason::PeerClosed,
                _ => {}
            }
        };

        self.conn.close(stop.as_str());
        info!(
            key = self.conn.key(),
            payloads = payload_count,
            bytes,
            stop = %stop,
            "Delivery loop finished"
        );

        DriverStats {
            payloads: payload_count,
            bytes,
            reads,
            received_bytes,
            stop,
        }
    }
}

/// Feed non-empty lines of `reader` into a channel from a background thread
///
/// The channel disconnects at end of input, on a read error, or when the
/// receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) if line.is_empty() => {}
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input");
                    break;
                }
            }
        }
    });
    rx
}

/// Channel pre-loaded with fixed messages, already disconnected
pub fn message_channel(messages: Vec<String>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    for message in messages {
        // The receiver is alive in this scope.
        let _ = tx.send(message);
    }
    rx
}
