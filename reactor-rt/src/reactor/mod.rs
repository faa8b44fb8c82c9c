//! The epoll-driven event-loop reactor (spec.md §4.4, ported from
//! `poller/event_poller.h`/`.cpp`).
//!
//! A [`Reactor`] owns exactly one OS thread running [`Reactor::run_loop`].
//! [`ReactorHandle`] is the `Send + Sync` clonable handle other threads
//! use to submit work, register fd interest, and schedule delay tasks;
//! all of it marshals onto the loop thread rather than touching the
//! epoll set or delay heap directly, preserving the single-writer
//! invariants in spec.md §3.

mod delay;

use crate::executor::{self, Executor};
use crate::load::LoadCounter;
use crate::pipe::WakeupPipe;
use crate::task::Task;
use crate::util::{self, ThreadPriority};
use delay::DelayHeap;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Readiness interest bits (spec.md §6). `ERROR` is always OR'd in by
/// the poller before dispatch; `LT` opts a registration out of the
/// edge-triggered default.
pub const READ: u32 = 1;
pub const WRITE: u32 = 2;
pub const ERROR: u32 = 4;
pub const LT: u32 = 8;

type EventCallback = Box<dyn FnMut(u32) + Send>;

struct EventEntry {
    mask: u32,
    /// `None` while a callback invocation for this fd is in flight
    /// (see `dispatch_event`): the events lock must not be held across
    /// a callback call, since the callback may re-enter `add_event`/
    /// `del_event` for the same fd from the same (loop) thread, which
    /// would deadlock against a held `Mutex`.
    cb: Option<EventCallback>,
}

struct Inner {
    epoll: Epoll,
    events: Mutex<HashMap<RawFd, EventEntry>>,
    delays: Mutex<DelayHeap>,
    ready: Mutex<std::collections::VecDeque<Box<dyn FnOnce() + Send>>>,
    wakeup: WakeupPipe,
    load: LoadCounter,
    exit: AtomicBool,
}

/// Clonable, `Send + Sync` handle used to drive a reactor from any
/// thread. Implements [`Executor`].
#[derive(Clone)]
pub struct ReactorHandle {
    inner: Arc<Inner>,
}

/// Owns the reactor's background OS thread.
pub struct Reactor {
    handle: ReactorHandle,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Reactor {
    /// Spawns the reactor's loop thread and returns once it is ready to
    /// accept submissions.
    pub fn spawn(priority: ThreadPriority) -> std::io::Result<Reactor> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        let wakeup = WakeupPipe::new().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

        epoll
            .add(
                wakeup.read_fd_borrow(),
                EpollEvent::new(EpollFlags::EPOLLIN, wakeup.read_fd() as u64),
            )
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

        let inner = Arc::new(Inner {
            epoll,
            events: Mutex::new(HashMap::new()),
            delays: Mutex::new(DelayHeap::new()),
            ready: Mutex::new(std::collections::VecDeque::new()),
            wakeup,
            load: LoadCounter::new(32, Duration::from_secs(2)),
            exit: AtomicBool::new(false),
        });
        let handle = ReactorHandle { inner };
        let loop_handle = handle.clone();

        let join = std::thread::Builder::new()
            .name("reactor".into())
            .spawn(move || {
                util::set_thread_priority(priority);
                executor::bind_current_reactor(loop_handle.clone());
                loop_handle.run_loop();
                executor::unbind_current_reactor();
            })?;

        Ok(Reactor {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    pub fn shutdown_and_join(mut self) {
        self.handle.shutdown();
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.handle.shutdown();
            if let Some(j) = self.join.take() {
                let _ = j.join();
            }
        }
    }
}

impl ReactorHandle {
    pub fn is_loop_thread(&self) -> bool {
        executor::current_reactor().is_some_and(|r| Arc::ptr_eq(&r.inner, &self.inner))
    }

    /// Registers `fd` for `interest` (spec.md §4.4.1). Edge-triggered
    /// unless `interest` includes [`LT`].
    pub fn add_event(&self, fd: RawFd, interest: u32, cb: impl FnMut(u32) + Send + 'static) {
        let inner = self.inner.clone();
        let op = move || inner.add_event_on_loop(fd, interest, Box::new(cb));
        self.run_on_loop(op);
    }

    pub fn modify_event(&self, fd: RawFd, interest: u32) {
        let inner = self.inner.clone();
        let op = move || inner.modify_event_on_loop(fd, interest);
        self.run_on_loop(op);
    }

    /// Deregisters `fd`. `completion`, if given, is invoked on the loop
    /// thread with whether the fd was actually registered.
    pub fn del_event(&self, fd: RawFd, completion: Option<Box<dyn FnOnce(bool) + Send>>) {
        let inner = self.inner.clone();
        let op = move || {
            let ok = inner.del_event_on_loop(fd);
            if let Some(c) = completion {
                c(ok);
            }
        };
        self.run_on_loop(op);
    }

    /// Schedules `task` to first fire `delay_ms` from now. The task
    /// returns the next delay in milliseconds, or 0 to stop.
    pub fn schedule(&self, delay_ms: u64, task: impl FnMut() -> u64 + Send + 'static) -> DelayHandle {
        let (owner, observer) = crate::task::cancelable(task);
        let deadline = util::current_millis() + delay_ms;
        let inner = self.inner.clone();
        let op = move || inner.delays.lock().unwrap().insert(deadline, observer);
        self.run_on_loop(op);
        DelayHandle { _owner: owner }
    }

    /// Runs `op` immediately if already on the loop thread, else
    /// marshals it through the ready-task list and wakes the loop.
    fn run_on_loop(&self, op: impl FnOnce() + Send + 'static) {
        if self.is_loop_thread() {
            op();
        } else {
            self.inner.ready.lock().unwrap().push_back(Box::new(op));
            self.inner.wakeup.wake();
        }
    }

    fn run_loop(&self) {
        tracing::debug!("reactor loop starting");
        let mut epoll_events = vec![EpollEvent::empty(); 256];

        while !self.inner.exit.load(Ordering::Acquire) {
            let timeout = self.inner.flush_due_delays();

            self.inner.load.going_idle();
            let n = match self.inner.epoll.wait(&mut epoll_events, timeout) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => 0,
                Err(e) => {
                    tracing::warn!(error = %e, "epoll_wait failed");
                    0
                }
            };
            self.inner.load.going_busy();

            for ev in &epoll_events[..n] {
                let fd = ev.data() as RawFd;
                if fd == self.inner.wakeup.read_fd() {
                    self.inner.wakeup.drain();
                    self.drain_ready();
                    continue;
                }
                self.inner.dispatch_event(fd, ev.events());
            }
        }
        tracing::debug!("reactor loop exiting");
    }

    fn drain_ready(&self) {
        let batch: Vec<_> = {
            let mut ready = self.inner.ready.lock().unwrap();
            std::mem::take(&mut *ready).into_iter().collect()
        };
        for op in batch {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(op)) {
                tracing::warn!(?panic, "reactor task panicked, continuing");
            }
        }
    }

    fn shutdown(&self) {
        let inner = self.inner.clone();
        self.run_on_loop(move || inner.exit.store(true, Ordering::Release));
    }
}

impl Inner {
    fn add_event_on_loop(&self, fd: RawFd, interest: u32, cb: EventCallback) {
        let flags = interest_to_epoll(interest);
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        if let Err(e) = self.epoll.add(borrowed, EpollEvent::new(flags, fd as u64)) {
            tracing::warn!(fd, error = %e, "epoll add failed");
            return;
        }
        self.events.lock().unwrap().insert(
            fd,
            EventEntry {
                mask: interest,
                cb: Some(cb),
            },
        );
    }

    fn modify_event_on_loop(&self, fd: RawFd, interest: u32) {
        let mut events = self.events.lock().unwrap();
        let Some(entry) = events.get_mut(&fd) else {
            tracing::warn!(fd, "modify_event on unregistered fd");
            return;
        };
        entry.mask = interest;
        let flags = interest_to_epoll(interest);
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        if let Err(e) = self.epoll.modify(borrowed, &mut EpollEvent::new(flags, fd as u64)) {
            tracing::warn!(fd, error = %e, "epoll modify failed");
        }
    }

    fn del_event_on_loop(&self, fd: RawFd) -> bool {
        let existed = self.events.lock().unwrap().remove(&fd).is_some();
        if existed {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            if let Err(e) = self.epoll.delete(borrowed) {
                tracing::warn!(fd, error = %e, "epoll delete failed");
            }
        }
        existed
    }

    fn dispatch_event(&self, fd: RawFd, raw: EpollFlags) {
        let mask = epoll_to_interest(raw);

        // Take the callback out and release the lock before calling it:
        // the callback may synchronously call back into `add_event`/
        // `del_event`/`modify_event` for this same fd (e.g. a socket
        // tearing itself down on error), which run inline on this same
        // loop thread and would deadlock on a re-locked `Mutex`.
        let mut cb = {
            let mut events = self.events.lock().unwrap();
            let Some(entry) = events.get_mut(&fd) else {
                // Late event for a since-removed fd: self-clean and move on.
                drop(events);
                let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
                let _ = self.epoll.delete(borrowed);
                return;
            };
            let Some(cb) = entry.cb.take() else {
                // Re-entrant dispatch for the same fd; shouldn't happen
                // since epoll_wait only reports each fd once per pass.
                return;
            };
            cb
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(mask)));
        if let Err(panic) = result {
            tracing::warn!(fd, ?panic, "socket event callback panicked, continuing");
        }

        // Put the callback back only if the callback itself didn't
        // remove this fd's registration (e.g. via `del_event`).
        if let Some(entry) = self.events.lock().unwrap().get_mut(&fd) {
            entry.cb = Some(cb);
        }
    }

    /// Runs all delay tasks whose deadline has passed, reinserting those
    /// that return a positive next-delay, and returns the timeout to use
    /// for the next `epoll_wait`.
    fn flush_due_delays(&self) -> EpollTimeout {
        loop {
            let now = util::current_millis();
            let due = {
                let mut delays = self.delays.lock().unwrap();
                delays.pop_due(now)
            };
            let Some(due) = due else {
                break;
            };
            for task in due {
                let next = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.call())) {
                    Ok(next) => next,
                    Err(panic) => {
                        tracing::warn!(?panic, "delay task panicked, not rescheduling");
                        0
                    }
                };
                if next > 0 {
                    self.delays
                        .lock()
                        .unwrap()
                        .insert(util::current_millis() + next, task);
                }
            }
        }

        let earliest = self.delays.lock().unwrap().earliest_deadline();
        match earliest {
            None => EpollTimeout::NONE,
            Some(deadline) => {
                let now = util::current_millis();
                let ms = deadline.saturating_sub(now);
                EpollTimeout::try_from(ms.min(i32::MAX as u64) as i32).unwrap_or(EpollTimeout::NONE)
            }
        }
    }
}

fn interest_to_epoll(interest: u32) -> EpollFlags {
    // ERROR is always OR'd in before submission to epoll_ctl, matching
    // spec.md §6 ("Edge interests"), even though the kernel reports
    // EPOLLERR/EPOLLHUP regardless of whether it was requested.
    let mut flags = EpollFlags::EPOLLERR;
    if interest & READ != 0 {
        flags |= EpollFlags::EPOLLIN;
    }
    if interest & WRITE != 0 {
        flags |= EpollFlags::EPOLLOUT;
    }
    if interest & LT == 0 {
        flags |= EpollFlags::EPOLLET;
    }
    flags
}

fn epoll_to_interest(flags: EpollFlags) -> u32 {
    let mut mask = 0;
    if flags.intersects(EpollFlags::EPOLLIN) {
        mask |= READ;
    }
    if flags.intersects(EpollFlags::EPOLLOUT) {
        mask |= WRITE;
    }
    if flags.intersects(EpollFlags::EPOLLERR | EpollFlags::EPOLLHUP) {
        mask |= ERROR;
    }
    mask
}

impl Executor for ReactorHandle {
    fn submit(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool) {
        if prefer_inline && self.is_loop_thread() {
            task();
            return;
        }
        self.inner.ready.lock().unwrap().push_back(task);
        self.inner.wakeup.wake();
    }

    fn submit_first(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool) {
        if prefer_inline && self.is_loop_thread() {
            task();
            return;
        }
        self.inner.ready.lock().unwrap().push_front(task);
        self.inner.wakeup.wake();
    }

    fn load(&self) -> u32 {
        self.inner.load.load()
    }

    fn is_self_thread(&self) -> bool {
        self.is_loop_thread()
    }
}

/// Handle returned by [`ReactorHandle::schedule`]. Dropping cancels the
/// underlying delay task if it hasn't fired yet.
pub struct DelayHandle {
    _owner: crate::task::CancelHandle<u64>,
}

impl DelayHandle {
    pub fn cancel(&self) {
        self._owner.cancel();
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
const _: fn() = assert_send_sync::<ReactorHandle>;
const _: fn() = assert_send_sync::<Task>;
