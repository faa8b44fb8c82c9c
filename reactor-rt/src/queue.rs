//! Unbounded FIFO task queue with a poison-budget shutdown protocol
//! (spec.md §4.2, ported from `thread/task_queue.h`).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    poison: u32,
}

/// Thread-safe, unbounded FIFO queue. `push_back`/`push_front` never
/// block; `pop` blocks until an item is available or the poison budget
/// is spent on an empty queue.
pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                poison: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn push_back(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.items.push_back(item);
        self.cond.notify_one();
    }

    /// Inserts before the oldest pending item. No ordering is
    /// guaranteed between concurrent `push_front` calls (spec.md §5).
    pub fn push_front(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.items.push_front(item);
        self.cond.notify_one();
    }

    /// Releases exactly `n` waiters so they can observe shutdown. If
    /// fewer than `n` threads are actually blocked in `pop`, the extra
    /// budget is simply consumed by whichever threads call `pop` next
    /// (spec.md §9's open question: "the pool may have fewer live
    /// workers than the poison count names; drain rather than rely on
    /// an exact count").
    pub fn poison(&self, n: u32) {
        let mut state = self.state.lock().unwrap();
        state.poison += n;
        self.cond.notify_all();
    }

    /// Blocks until an item is available, returning `Some`, or until the
    /// queue is empty and the poison budget is non-zero, returning
    /// `None` (and consuming one unit of poison). A waiter that wakes
    /// always finds either work or poison — no spurious `None`.
    pub fn pop(&self) -> Option<T> {
        let mut state = self
            .cond
            .wait_while(self.state.lock().unwrap(), |s| {
                s.items.is_empty() && s.poison == 0
            })
            .unwrap();

        if let Some(item) = state.items.pop_front() {
            return Some(item);
        }

        debug_assert!(state.poison > 0);
        state.poison -= 1;
        None
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_preserved_for_push_back() {
        let q = TaskQueue::new();
        q.push_back(1);
        q.push_back(2);
        q.push_back(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn push_front_inserts_before_oldest() {
        let q = TaskQueue::new();
        q.push_back(1);
        q.push_back(2);
        q.push_front(0);
        assert_eq!(q.pop(), Some(0));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn poison_unblocks_waiters_on_empty_queue() {
        let q: Arc<TaskQueue<i32>> = Arc::new(TaskQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        // give the waiter a moment to block, then poison it
        thread::sleep(std::time::Duration::from_millis(20));
        q.poison(1);
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn work_drains_before_poison_is_observed() {
        let q = TaskQueue::new();
        q.push_back(1);
        q.poison(1);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }
}
