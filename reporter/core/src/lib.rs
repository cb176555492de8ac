//! Reporter Core - Unix Socket Report Client
//!
//! This crate provides a single, owned client connection to a local
//! collector over a Unix domain stream socket. It connects with a bounded
//! timeout, tunes the socket, pushes payloads with a bounded retry budget,
//! and polls inbound data without ever blocking the caller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Driver (CLI, app)                      │
//! │     decides when to read, when to write, when to give up      │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ start / write / close        │ read(now)
//! ┌───────────────┴──────────────────────────────┴───────────────┐
//! │                         Connection                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │   State    │  │ SendPolicy   │  │  ConnectionObserver   │  │
//! │  │  machine   │  │ (retry loop) │  │  (tracing / recorder) │  │
//! │  └────────────┘  └──────────────┘  └───────────────────────┘  │
//! │                    UnixSocket (OwnedFd)                       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ AF_UNIX / SOCK_STREAM
//!                        ┌───────┴───────┐
//!                        │   Collector   │
//!                        └───────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Connection`]: Lifecycle and I/O state machine
//! - [`TransportError`]: Usage and fatal I/O errors
//! - [`ConnectionObserver`]: Side channel for transitions and errors
//! - [`ReporterConfig`]: Layered configuration (defaults, file, env, CLI)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::{Duration, Instant};
//! use reporter_core::Connection;
//!
//! let mut conn = Connection::new(1, "/run/collector/collector.sock");
//! conn.start(Duration::from_secs(1), Duration::from_millis(500))?;
//! conn.write(b"hello", Instant::now())?;
//!
//! loop {
//!     if conn.read(Instant::now()).is_disconnected() {
//!         break;
//!     }
//!     // do other work
//! }
//! conn.close("done");
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: Socket, connection state machine, observer, errors
//! - [`config`]: Configuration file, environment and override handling

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod transport;

// Transport exports
pub use transport::{
    default_socket_path, is_transient, ConnKey, Connection, ConnectionEvent, ConnectionObserver,
    ConnectionState, EventKind, ReadOutcome, RecordingObserver, SendPolicy, SocketOption,
    TracingObserver, TransportError, DEFAULT_SEND_ATTEMPTS, DEFAULT_SEND_RETRY_INTERVAL,
    SOCKET_BUFFER_SIZE,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ConnectionConfig, ReporterConfig, ReporterToml,
};
