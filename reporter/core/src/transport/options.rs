//! Steady-State Socket Tuning
//!
//! Options applied once after a successful connect. Every option is best
//! effort: a failure is reported to the caller and the next option is still
//! attempted.

use std::fmt;
use std::io;
use std::time::Duration;

use super::socket::UnixSocket;

/// Capacity of the receive buffer, also used as the kernel send buffer size
pub const SOCKET_BUFFER_SIZE: usize = 5120;

/// Socket settings the connection touches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketOption {
    /// `SO_SNDTIMEO` installed while connecting
    ConnectTimeout,
    /// `SO_SNDTIMEO` after connect
    SendTimeout,
    /// `SO_RCVTIMEO` after connect
    ReceiveTimeout,
    /// `TCP_NODELAY`
    NoDelay,
    /// `SO_KEEPALIVE`
    KeepAlive,
    /// `SO_LINGER` with a zero timeout
    Linger,
    /// `SO_SNDBUF`
    SendBuffer,
    /// `SO_NOSIGPIPE` (Apple platforms)
    NoSigPipe,
    /// `O_NONBLOCK`
    NonBlocking,
}

impl SocketOption {
    /// The OS-level name of the option
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectTimeout | Self::SendTimeout => "SO_SNDTIMEO",
            Self::ReceiveTimeout => "SO_RCVTIMEO",
            Self::NoDelay => "TCP_NODELAY",
            Self::KeepAlive => "SO_KEEPALIVE",
            Self::Linger => "SO_LINGER",
            Self::SendBuffer => "SO_SNDBUF",
            Self::NoSigPipe => "SO_NOSIGPIPE",
            Self::NonBlocking => "O_NONBLOCK",
        }
    }
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a tuning pass
#[derive(Debug, Default)]
pub(crate) struct TuningReport {
    pub applied: Vec<SocketOption>,
    pub failed: Vec<(SocketOption, io::Error)>,
}

impl TuningReport {
    fn record(&mut self, option: SocketOption, result: io::Result<()>) {
        match result {
            Ok(()) => self.applied.push(option),
            Err(e) => self.failed.push((option, e)),
        }
    }
}

/// Apply the steady-state options to a connected socket
pub(crate) fn apply_steady_state(socket: &UnixSocket, io_timeout: Duration) -> TuningReport {
    let mut report = TuningReport::default();
    let on: libc::c_int = 1;

    report.record(SocketOption::SendTimeout, socket.set_send_timeout(io_timeout));
    report.record(
        SocketOption::ReceiveTimeout,
        socket.set_receive_timeout(io_timeout),
    );
    report.record(
        SocketOption::NoDelay,
        socket.set_option(libc::IPPROTO_TCP, libc::TCP_NODELAY, &on),
    );
    report.record(
        SocketOption::KeepAlive,
        socket.set_option(libc::SOL_SOCKET, libc::SO_KEEPALIVE, &on),
    );

    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    report.record(
        SocketOption::Linger,
        socket.set_option(libc::SOL_SOCKET, libc::SO_LINGER, &linger),
    );

    let send_buffer = SOCKET_BUFFER_SIZE as libc::c_int;
    report.record(
        SocketOption::SendBuffer,
        socket.set_option(libc::SOL_SOCKET, libc::SO_SNDBUF, &send_buffer),
    );

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    report.record(
        SocketOption::NoSigPipe,
        socket.set_option(libc::SOL_SOCKET, libc::SO_NOSIGPIPE, &on),
    );

    report
}
