//! Delay-task multi-map keyed by absolute deadline in milliseconds
//! (spec.md §3 `DelayEntry`). Touched only on the reactor's loop
//! thread; duplicate deadlines are fine, kept in insertion order.

use crate::task::DelayTask;
use std::collections::BTreeMap;

pub(super) struct DelayHeap {
    by_deadline: BTreeMap<u64, Vec<DelayTask>>,
}

impl DelayHeap {
    pub fn new() -> Self {
        DelayHeap {
            by_deadline: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, deadline_ms: u64, task: DelayTask) {
        self.by_deadline.entry(deadline_ms).or_default().push(task);
    }

    /// Removes and returns every task whose deadline is `<= now`, in
    /// deadline order (ties are stable within this one pass).
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Vec<DelayTask>> {
        let due_keys: Vec<u64> = self
            .by_deadline
            .range(..=now_ms)
            .map(|(k, _)| *k)
            .collect();
        if due_keys.is_empty() {
            return None;
        }
        let mut out = Vec::new();
        for k in due_keys {
            if let Some(mut tasks) = self.by_deadline.remove(&k) {
                out.append(&mut tasks);
            }
        }
        Some(out)
    }

    pub fn earliest_deadline(&self) -> Option<u64> {
        self.by_deadline.keys().next().copied()
    }
}
