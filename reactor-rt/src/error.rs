//! Public error taxonomy (spec.md §6-7).
//!
//! Three tiers live at different layers of the crate rather than in one
//! enum: recoverable syscall errors (EAGAIN/EINTR) are retried and never
//! escape their call site; socket-session errors are this [`SockError`];
//! programmer errors surface as plain `Result` returns from constructors.

use std::fmt;
use std::io;

/// Socket-session error taxonomy, delivered via a socket's error
/// callback on the reactor thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockError {
    Success,
    Eof,
    Timeout,
    Refused,
    Unreachable,
    Shutdown,
    Other(String),
}

impl SockError {
    pub fn is_success(&self) -> bool {
        matches!(self, SockError::Success)
    }

    /// Normalizes a raw OS error per spec.md §6: `EINPROGRESS`,
    /// `ENOBUFS`, and `EWOULDBLOCK` all collapse to "would block",
    /// which callers treat as success-in-progress rather than failure.
    pub fn from_io(err: &io::Error) -> SockError {
        match err.raw_os_error().map(nix::errno::Errno::from_raw) {
            Some(nix::errno::Errno::EAGAIN | nix::errno::Errno::EINPROGRESS | nix::errno::Errno::ENOBUFS) => {
                SockError::Success
            }
            Some(nix::errno::Errno::ECONNREFUSED) => SockError::Refused,
            Some(nix::errno::Errno::ETIMEDOUT) => SockError::Timeout,
            Some(nix::errno::Errno::EHOSTUNREACH | nix::errno::Errno::ENETUNREACH) => {
                SockError::Unreachable
            }
            Some(nix::errno::Errno::EPIPE | nix::errno::Errno::ECONNRESET) => SockError::Shutdown,
            _ => SockError::Other(err.to_string()),
        }
    }
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockError::Success => write!(f, "success"),
            SockError::Eof => write!(f, "end of file"),
            SockError::Timeout => write!(f, "operation timed out"),
            SockError::Refused => write!(f, "connection refused"),
            SockError::Unreachable => write!(f, "host unreachable"),
            SockError::Shutdown => write!(f, "connection shut down"),
            SockError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for SockError {}

impl From<io::Error> for SockError {
    fn from(e: io::Error) -> Self {
        SockError::from_io(&e)
    }
}
