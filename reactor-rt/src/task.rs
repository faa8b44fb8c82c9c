//! Cancelable callable (spec.md §4.1).
//!
//! A [`Cancelable`] owns a callable behind an `Arc<Mutex<..>>` so the
//! same allocation can be shared across the thread that submitted it
//! (the owning [`CancelHandle`]) and the thread that eventually invokes
//! it (the queue consumer, holding a [`Weak`] observer). Canceling drops
//! the callable; a later call through an observer that has lost the
//! race returns `R::default()` without running anything, mirroring the
//! two-shared-pointer trick in `thread/task.h`'s `TaskCancelableImpl`.

use std::sync::{Arc, Mutex, Weak};

type Slot<R> = Arc<Mutex<Option<Box<dyn FnMut() -> R + Send>>>>;

/// Observer handle: upgrades to the callable if it hasn't been
/// canceled, otherwise yields `R::default()`. Calling never panics and
/// never re-invokes a callable that has already been taken by a prior
/// call (each slot runs at most once, since invocation `take()`s it).
#[derive(Clone)]
pub struct TaskHandle<R> {
    slot: Weak<Mutex<Option<Box<dyn FnMut() -> R + Send>>>>,
}

impl<R: Default> TaskHandle<R> {
    pub fn call(&self) -> R {
        let Some(slot) = self.slot.upgrade() else {
            return R::default();
        };
        let mut guard = slot.lock().unwrap();
        match guard.as_mut() {
            Some(f) => f(),
            None => R::default(),
        }
    }

    /// True if the callable is still reachable and has not been
    /// canceled. Racy by nature (another thread may cancel immediately
    /// after), used only as a fast-path hint.
    pub fn is_live(&self) -> bool {
        self.slot.upgrade().is_some()
    }
}

/// Owning side. Dropping or calling [`CancelHandle::cancel`] clears the
/// slot; cancellation is idempotent and does not interrupt an
/// invocation already in progress (the mutex serializes with any
/// concurrent `call`).
pub struct CancelHandle<R> {
    slot: Slot<R>,
}

impl<R> CancelHandle<R> {
    pub fn cancel(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

/// Creates a cancelable callable, returning the owning handle and a
/// weak observer. The observer is what gets placed in a task queue; the
/// owning handle is what callers use to cancel before it runs.
pub fn cancelable<R, F>(f: F) -> (CancelHandle<R>, TaskHandle<R>)
where
    F: FnMut() -> R + Send + 'static,
{
    let slot: Slot<R> = Arc::new(Mutex::new(Some(Box::new(f))));
    let observer = TaskHandle {
        slot: Arc::downgrade(&slot),
    };
    (CancelHandle { slot }, observer)
}

/// A runnable unit of work with no return value, as queued by
/// [`crate::queue::TaskQueue`] and the reactor's ready-task list.
pub type Task = TaskHandle<()>;

/// A delay-task callable: returns the next delay in milliseconds, or 0
/// to mean "do not reschedule" (spec.md §4.4.1 `schedule`).
pub type DelayTask = TaskHandle<u64>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn uncanceled_observer_runs_the_callable() {
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let (_owner, observer) = cancelable(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        observer.call();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn canceled_observer_returns_default_without_running() {
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        let (owner, observer) = cancelable(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        owner.cancel();
        observer.call();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (owner, _observer) = cancelable(|| 7i32);
        owner.cancel();
        owner.cancel();
    }

    #[test]
    fn dropped_owner_behaves_like_cancel() {
        let observer = {
            let (owner, observer) = cancelable(|| 42u64);
            drop(owner);
            observer
        };
        assert_eq!(observer.call(), 0);
    }

    #[test]
    fn delay_task_returns_next_delay() {
        let (_owner, observer) = cancelable(|| 10u64);
        assert_eq!(observer.call(), 10);
    }
}
