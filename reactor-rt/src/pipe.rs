//! Wakeup pipe (spec.md §4.9, ported from `poller/pipe_wrapper.h`).
//!
//! A connected fd pair used purely as an edge-signaling wakeup: writing
//! one byte unblocks a reactor parked in `epoll_wait`. Both ends are
//! non-blocking, per spec.md's stated preference.

use nix::fcntl::OFlag;
use nix::unistd::{self, pipe2};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

pub struct WakeupPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl WakeupPipe {
    pub fn new() -> nix::Result<Self> {
        let (read, write) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
        Ok(WakeupPipe { read, write })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn read_fd_borrow(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    /// Edge-signaling: writes one byte, retrying across `EINTR`.
    pub fn wake(&self) {
        let buf = [0u8; 1];
        loop {
            match unistd::write(self.write.as_fd(), &buf) {
                Ok(_) => return,
                Err(nix::errno::Errno::EINTR) => continue,
                // A full pipe buffer still means a wakeup is pending; nothing to do.
                Err(nix::errno::Errno::EAGAIN) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "wakeup pipe write failed");
                    return;
                }
            }
        }
    }

    /// Drains all pending wakeup bytes until `EAGAIN`, as required by
    /// edge-triggered registration.
    pub fn drain(&self) {
        let mut buf = [0u8; 256];
        loop {
            match unistd::read(self.read.as_fd(), &mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(nix::errno::Errno::EAGAIN) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "wakeup pipe read failed");
                    return;
                }
            }
        }
    }
}
