//! Unix Stream Socket
//!
//! Thin owning wrapper over an `AF_UNIX`/`SOCK_STREAM` descriptor. The
//! standard library's `UnixStream::connect` does not let us set options
//! between `socket(2)` and `connect(2)`, and the connect timeout has to be
//! installed in that window, so the syscalls are issued directly.
//!
//! The descriptor lives in an `OwnedFd`: dropping the socket closes it,
//! exactly once.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCKET_FLAGS: libc::c_int = libc::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCKET_FLAGS: libc::c_int = 0;

// Apple platforms have no MSG_NOSIGNAL; SO_NOSIGPIPE is set at tuning time instead.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const SEND_FLAGS: libc::c_int = 0;

/// Why a path cannot be used as a Unix socket address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AddressError {
    Empty,
    TooLong,
    InteriorNul,
}

impl AddressError {
    pub(crate) fn reason(self) -> &'static str {
        match self {
            Self::Empty => "path is empty",
            Self::TooLong => "path does not fit in sun_path",
            Self::InteriorNul => "path contains a NUL byte",
        }
    }
}

/// Build a `sockaddr_un` for a filesystem path
pub(crate) fn unix_address(path: &Path) -> Result<libc::sockaddr_un, AddressError> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() {
        return Err(AddressError::Empty);
    }
    if bytes.contains(&0) {
        return Err(AddressError::InteriorNul);
    }

    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    // Leave room for the trailing NUL.
    if bytes.len() >= addr.sun_path.len() {
        return Err(AddressError::TooLong);
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok(addr)
}

/// Convert a duration to a `timeval` for `SO_SNDTIMEO`/`SO_RCVTIMEO`
///
/// Zero stays zero (no timeout). Non-zero durations shorter than a
/// microsecond round up so they are not silently turned into "block forever".
pub(crate) fn timeval(duration: Duration) -> libc::timeval {
    if duration.is_zero() {
        return libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
    }

    let secs = libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX);
    let mut micros = duration.subsec_micros();
    if secs == 0 && micros == 0 {
        micros = 1;
    }
    libc::timeval {
        tv_sec: secs,
        tv_usec: micros as libc::suseconds_t,
    }
}

/// Map a `-1` syscall return to the thread's last OS error
fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// An open `AF_UNIX` stream socket
#[derive(Debug)]
pub(crate) struct UnixSocket {
    fd: OwnedFd,
}

impl UnixSocket {
    /// Open a new, unconnected stream socket
    pub(crate) fn open() -> io::Result<Self> {
        // SAFETY: socket(2) takes no pointers.
        let raw = check(unsafe {
            libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | SOCKET_FLAGS, 0)
        })?;
        // SAFETY: `raw` was just returned by socket(2) and nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }

    /// Blocking connect to a prepared address
    pub(crate) fn connect(&self, addr: &libc::sockaddr_un) -> io::Result<()> {
        let len = mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
        // SAFETY: `addr` points to a fully initialised sockaddr_un of `len` bytes.
        check(unsafe {
            libc::connect(
                self.fd.as_raw_fd(),
                (addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        })?;
        Ok(())
    }

    /// Set a socket option from a plain value
    pub(crate) fn set_option<T>(
        &self,
        level: libc::c_int,
        name: libc::c_int,
        value: &T,
    ) -> io::Result<()> {
        let len = mem::size_of::<T>() as libc::socklen_t;
        // SAFETY: `value` is a live reference to `len` readable bytes.
        check(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                level,
                name,
                (value as *const T).cast::<libc::c_void>(),
                len,
            )
        })?;
        Ok(())
    }

    /// Set the send timeout (`SO_SNDTIMEO`)
    pub(crate) fn set_send_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.set_option(libc::SOL_SOCKET, libc::SO_SNDTIMEO, &timeval(timeout))
    }

    /// Set the receive timeout (`SO_RCVTIMEO`)
    pub(crate) fn set_receive_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.set_option(libc::SOL_SOCKET, libc::SO_RCVTIMEO, &timeval(timeout))
    }

    /// Toggle `O_NONBLOCK`
    pub(crate) fn set_nonblocking(&self, on: bool) -> io::Result<()> {
        let fd = self.fd.as_raw_fd();
        // SAFETY: fcntl(F_GETFL) takes no pointers.
        let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        let wanted = if on {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if wanted != flags {
            // SAFETY: fcntl(F_SETFL) takes an integer argument, no pointers.
            check(unsafe { libc::fcntl(fd, libc::F_SETFL, wanted) })?;
        }
        Ok(())
    }

    /// One `send(2)` of as much of `buf` as the kernel accepts
    pub(crate) fn send(&self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid slice for `buf.len()` bytes.
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
                SEND_FLAGS,
            )
        };
        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }

    /// One `recv(2)` into `buf`; `Ok(0)` means the peer shut down
    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid, writable slice for `buf.len()` bytes.
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        };
        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }
}

impl AsRawFd for UnixSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn test_unix_address_rejects_bad_paths() {
        assert_eq!(unix_address(Path::new("")).err(), Some(AddressError::Empty));

        let long = format!("/tmp/{}", "x".repeat(200));
        assert_eq!(
            unix_address(Path::new(&long)).err(),
            Some(AddressError::TooLong)
        );

        let with_nul = std::ffi::OsStr::from_bytes(b"/tmp/a\0b.sock");
        assert_eq!(
            unix_address(Path::new(with_nul)).err(),
            Some(AddressError::InteriorNul)
        );
    }

    #[test]
    fn test_unix_address_copies_path() {
        let addr = unix_address(Path::new("/tmp/test.sock")).unwrap();
        assert_eq!(addr.sun_family, libc::AF_UNIX as libc::sa_family_t);
        let copied: Vec<u8> = addr
            .sun_path
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8)
            .collect();
        assert_eq!(copied, b"/tmp/test.sock");
    }

    #[test]
    fn test_timeval_conversion() {
        let tv = timeval(Duration::from_millis(1500));
        assert_eq!(tv.tv_sec, 1);
        assert_eq!(tv.tv_usec, 500_000);

        let zero = timeval(Duration::ZERO);
        assert_eq!((zero.tv_sec, zero.tv_usec), (0, 0));

        let tiny = timeval(Duration::from_nanos(10));
        assert_eq!((tiny.tv_sec, tiny.tv_usec), (0, 1));
    }

    #[test]
    fn test_connect_send_recv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peer.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let socket = UnixSocket::open().unwrap();
        socket.connect(&unix_address(&path).unwrap()).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        assert_eq!(socket.send(b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        socket.set_nonblocking(true).unwrap();
        let mut inbound = [0u8; 16];
        let err = socket.recv(&mut inbound).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(peer);
        assert_eq!(socket.recv(&mut inbound).unwrap(), 0);
    }

    #[test]
    fn test_connect_missing_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.sock");

        let socket = UnixSocket::open().unwrap();
        let err = socket.connect(&unix_address(&path).unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
