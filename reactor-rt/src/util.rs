//! Small platform helpers that the rest of the crate treats as opaque
//! collaborators: current time and best-effort thread scheduling hints.

use std::time::{SystemTime, UNIX_EPOCH};

/// Scheduling priority hint applied to a [`crate::worker::Worker`] or
/// [`crate::reactor::Reactor`]'s loop thread.
///
/// Applying a priority is best-effort: a process without `CAP_SYS_NICE`
/// cannot raise its own niceness, and this crate logs and continues
/// rather than failing construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

impl ThreadPriority {
    /// Maps to a `setpriority(2)` niceness value in `[-20, 19]`.
    fn niceness(self) -> i32 {
        match self {
            ThreadPriority::Lowest => 19,
            ThreadPriority::Low => 10,
            ThreadPriority::Normal => 0,
            ThreadPriority::High => -5,
            ThreadPriority::Highest => -10,
        }
    }
}

/// Applies `priority` to the calling thread via `setpriority(2)`.
///
/// Best-effort: failures (typically `EACCES` / `EPERM` without
/// `CAP_SYS_NICE`) are logged at `warn` and otherwise ignored, matching
/// spec.md's "mapped to the OS's scheduler parameters on a best-effort
/// basis."
pub fn set_thread_priority(priority: ThreadPriority) {
    // PRIO_PROCESS + tid applies to the calling thread specifically
    // (Linux treats each thread as its own "process" for setpriority).
    let tid = unsafe { nix::libc::syscall(nix::libc::SYS_gettid) } as nix::libc::id_t;
    let rc = unsafe { nix::libc::setpriority(nix::libc::PRIO_PROCESS, tid, priority.niceness()) };
    if rc != 0 {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            ?priority,
            "failed to set thread priority, continuing at default"
        );
    }
}

/// Current time in whole microseconds since the Unix epoch.
pub fn current_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as u64
}

/// Current time in whole milliseconds since the Unix epoch.
pub fn current_millis() -> u64 {
    current_micros() / 1000
}

/// Current time in whole seconds since the Unix epoch.
pub fn current_seconds() -> u64 {
    current_micros() / 1_000_000
}
