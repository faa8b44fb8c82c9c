//! Counted semaphore (spec.md §4, ported from `thread/semaphore.h`),
//! used by the executor's `sync`/`sync_first` to block the caller until
//! the submitted task completes.

use std::sync::{Condvar, Mutex};

pub struct Semaphore {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl Semaphore {
    pub fn new() -> Self {
        Semaphore {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn post(&self, n: u32) {
        let mut count = self.count.lock().unwrap();
        *count += n;
        if n > 1 {
            self.cond.notify_all();
        } else {
            self.cond.notify_one();
        }
    }

    /// Blocks until the count is non-zero, then decrements it by one.
    /// Guards against spurious wakeups.
    pub fn wait(&self) {
        let mut count = self
            .cond
            .wait_while(self.count.lock().unwrap(), |c| *c == 0)
            .unwrap();
        *count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn post_then_wait_does_not_block() {
        let sem = Semaphore::new();
        sem.post(1);
        sem.wait();
    }

    #[test]
    fn wait_blocks_until_posted() {
        let sem = Arc::new(Semaphore::new());
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.wait());
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        sem.post(1);
        handle.join().unwrap();
    }
}
