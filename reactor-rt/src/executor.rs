//! The `Executor` trait shared by [`crate::reactor::ReactorHandle`] and
//! [`crate::worker::WorkerHandle`] (spec.md §4.5/§5), plus the
//! process-wide "am I running on a reactor thread" registry used by
//! `current_reactor()` lookups (spec.md §4.4.4).
//!
//! The C++ original keys a global map by OS thread id. The idiomatic
//! Rust equivalent is a `thread_local!` slot set once when a reactor's
//! loop thread starts: every thread either has an attached reactor or
//! doesn't, and checking it never takes a lock. This is the crate's
//! resolution of that design's open corner (see DESIGN.md).

use crate::reactor::ReactorHandle;
use crate::semaphore::Semaphore;
use crate::task::Task;
use std::cell::RefCell;

thread_local! {
    static CURRENT_REACTOR: RefCell<Option<ReactorHandle>> = const { RefCell::new(None) };
}

/// Registers `reactor` as the one attached to the calling thread. Called
/// once by a reactor's loop thread before entering `run_loop`.
pub(crate) fn bind_current_reactor(reactor: ReactorHandle) {
    CURRENT_REACTOR.with(|slot| *slot.borrow_mut() = Some(reactor));
}

pub(crate) fn unbind_current_reactor() {
    CURRENT_REACTOR.with(|slot| *slot.borrow_mut() = None);
}

/// Returns the reactor bound to the calling thread, if any.
pub fn current_reactor() -> Option<ReactorHandle> {
    CURRENT_REACTOR.with(|slot| slot.borrow().clone())
}

/// Something that can run work: a reactor or a worker. `submit`/
/// `submit_first` mirror push-back/push-front ordering on the
/// executor's queue; `sync`/`sync_first` block the caller until the
/// task completes.
pub trait Executor: Send + Sync {
    /// Runs `task` on this executor. If `prefer_inline` and the caller
    /// is already running on this executor's own thread, runs
    /// immediately and returns without a handle; otherwise enqueues and
    /// wakes the executor.
    fn submit(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool);

    /// Same as `submit` but enqueues at the front of the queue.
    fn submit_first(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool);

    /// Busy percentage in `0..=100` from this executor's load counter.
    fn load(&self) -> u32;

    /// True if the calling thread is this executor's own loop thread.
    fn is_self_thread(&self) -> bool;

    fn submit_task(&self, task: Task) {
        self.submit(Box::new(move || { task.call(); }), true);
    }

    fn submit_task_first(&self, task: Task) {
        self.submit_first(Box::new(move || { task.call(); }), true);
    }

    /// Blocks the caller until `task` has run to completion.
    fn sync(&self, task: Box<dyn FnOnce() + Send>) {
        sync_via(self, task, false);
    }

    /// Same as `sync` but enqueues at the front of the queue.
    fn sync_first(&self, task: Box<dyn FnOnce() + Send>) {
        sync_via(self, task, true);
    }
}

fn sync_via<E: Executor + ?Sized>(exec: &E, task: Box<dyn FnOnce() + Send>, front: bool) {
    let sem = std::sync::Arc::new(Semaphore::new());
    let sem2 = sem.clone();
    let wrapped: Box<dyn FnOnce() + Send> = Box::new(move || {
        task();
        sem2.post(1);
    });
    if front {
        exec.submit_first(wrapped, true);
    } else {
        exec.submit(wrapped, true);
    }
    sem.wait();
}
