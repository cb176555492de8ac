//! Report Sender
//!
//! Connects to a local collector over a Unix socket and delivers one
//! payload per line. Payloads come from repeated `--message` flags or, when
//! none are given, from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Send two messages to the default socket
//! report-send -m "disk ok" -m "load 0.3"
//!
//! # Stream stdin to a custom socket, give up after 30s of silence
//! tail -f events.log | report-send --socket /run/collector.sock --idle-timeout-secs 30
//!
//! # Verbose logging
//! RUST_LOG=debug report-send -m hello
//! ```
//!
//! # Environment Variables
//!
//! - `REPORTER_CONFIG`: Config file path
//! - `REPORTER_SOCKET`, `REPORTER_KEY`, ...: See `reporter_core::config`
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Close the connection and exit
//!
//! # Exit Status
//!
//! Non-zero when the connection cannot be started or when delivery is cut
//! short by the collector.

mod driver;

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing::info;

use reporter_core::{load_config_from_path, ConfigOverrides, ConnKey};

use driver::{message_channel, spawn_line_reader, Driver, DriverConfig};

/// Report Sender - deliver line-oriented reports to a local collector
#[derive(Parser, Debug)]
#[command(name = "report-send")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Collector socket path
    #[arg(short = 's', long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Connection key used in logs
    #[arg(short = 'k', long, allow_negative_numbers = true)]
    key: Option<ConnKey>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "REPORTER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Connect timeout in milliseconds (0 = none)
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Send/receive timeout in milliseconds (0 = none)
    #[arg(long, value_name = "MS")]
    io_timeout_ms: Option<u64>,

    /// Close after this many seconds without a send (0 = never)
    #[arg(long, default_value_t = 0, value_name = "SECS")]
    idle_timeout_secs: u64,

    /// How often to poll the socket while waiting for input
    #[arg(long, default_value_t = 10, value_name = "MS")]
    poll_interval_ms: u64,

    /// Payload to send (repeatable); stdin is used when absent
    #[arg(short = 'm', long = "message", value_name = "TEXT")]
    messages: Vec<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(path) = &self.socket {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(key) = self.key {
            overrides = overrides.with_key(key);
        }
        if let Some(ms) = self.connect_timeout_ms {
            overrides = overrides.with_connect_timeout_ms(ms);
        }
        if let Some(ms) = self.io_timeout_ms {
            overrides = overrides.with_io_timeout_ms(ms);
        }
        overrides
    }

    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("report_send=info".parse()?)
                .add_directive("reporter_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&shutdown)).context("Failed to install SIGINT handler")?;
    flag::register(SIGTERM, Arc::clone(&shutdown))
        .context("Failed to install SIGTERM handler")?;

    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config
        .connection
        .validate()
        .context("Invalid configuration")?;

    let settings = &config.connection;
    let socket_path = settings.socket_path();
    info!(
        key = settings.key,
        path = ?socket_path,
        source = ?config.source(),
        "Starting report sender"
    );

    let mut conn = settings.connection();
    conn.start(settings.connect_timeout(), settings.io_timeout())
        .with_context(|| format!("Failed to connect to collector at {socket_path:?}"))?;

    let payloads = if args.messages.is_empty() {
        spawn_line_reader(BufReader::new(std::io::stdin()))
    } else {
        message_channel(args.messages.clone())
    };

    let stats = Driver::new(conn, args.driver_config()).run(&payloads, &shutdown);

    info!(
        payloads = stats.payloads,
        bytes = stats.bytes,
        reads = stats.reads,
        received_bytes = stats.received_bytes,
        stop = %stats.stop,
        "Report sender finished"
    );

    if stats.stop.is_failure() {
        anyhow::bail!(
            "Delivery stopped early ({}) after {} payload(s)",
            stats.stop,
            stats.payloads
        );
    }
    Ok(())
}
