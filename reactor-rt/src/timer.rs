//! Periodic timer built on [`crate::reactor::ReactorHandle::schedule`]
//! (spec.md §4.4.1, ported from `poller/timer.h`/`.cpp`).
//!
//! `Timer::periodic` fires `callback` every `period_ms` until dropped,
//! canceled, or (absent `continue_on_exception`) until `callback` panics
//! once.

use crate::reactor::{DelayHandle, ReactorHandle};
use std::panic::AssertUnwindSafe;

pub struct Timer {
    handle: DelayHandle,
}

impl Timer {
    /// Schedules `callback` to run every `period_ms`, starting after one
    /// period. If `callback` panics, the panic is caught and logged; the
    /// timer then stops unless `continue_on_exception` is set, in which
    /// case it keeps firing on the same period (spec.md §4.4.2).
    pub fn periodic(
        reactor: &ReactorHandle,
        period_ms: u64,
        continue_on_exception: bool,
        mut callback: impl FnMut() + Send + 'static,
    ) -> Timer {
        let handle = reactor.schedule(period_ms, move || {
            match std::panic::catch_unwind(AssertUnwindSafe(&mut callback)) {
                Ok(()) => period_ms,
                Err(panic) => {
                    tracing::warn!(?panic, "timer callback panicked");
                    if continue_on_exception {
                        period_ms
                    } else {
                        0
                    }
                }
            }
        });
        Timer { handle }
    }

    /// Schedules `callback` to run once, after `delay_ms`.
    pub fn once(
        reactor: &ReactorHandle,
        delay_ms: u64,
        callback: impl FnOnce() + Send + 'static,
    ) -> Timer {
        let mut callback = Some(callback);
        let handle = reactor.schedule(delay_ms, move || {
            if let Some(cb) = callback.take()
                && let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(cb)) {
                    tracing::warn!(?panic, "one-shot timer callback panicked");
                }
            0
        });
        Timer { handle }
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;
    use crate::util::ThreadPriority;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn periodic_timer_fires_repeatedly() {
        let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let timer = Timer::periodic(&reactor.handle(), 10, false, move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(105));
        timer.cancel();
        let n = count.load(Ordering::SeqCst);
        assert!((8..=12).contains(&n), "expected roughly 10 ticks, got {n}");
    }

    #[test]
    fn one_shot_timer_fires_exactly_once() {
        let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let _timer = Timer::once(&reactor.handle(), 20, move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_stops_unless_continue_on_exception() {
        let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let timer = Timer::periodic(&reactor.handle(), 10, false, move || {
            count2.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        });
        std::thread::sleep(Duration::from_millis(60));
        timer.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
