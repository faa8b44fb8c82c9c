//! Fixed-size executor pool with least-load-with-rotating-start
//! selection (spec.md §4.5, ported from `thread/worker.h`'s
//! `WorkerPool` plus the event-poller-pool half of
//! `poller/event_poller.h`).

use crate::executor::Executor;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A fixed vector of executors, append-only after construction (spec.md
/// §3 invariant). `acquire()` implements least-load routing with a
/// rotating start point so repeated calls fan out round-robin among
/// equally-loaded executors instead of always picking index 0.
pub struct ExecutorPool<E: Executor> {
    executors: Vec<Arc<E>>,
    cursor: AtomicUsize,
    /// If true, a caller already running on one of this pool's
    /// executors gets that executor back without scanning — preserves
    /// affinity for chained operations (spec.md §4.5).
    prefer_current: bool,
}

impl<E: Executor> ExecutorPool<E> {
    pub fn new(executors: Vec<Arc<E>>, prefer_current: bool) -> Self {
        ExecutorPool {
            executors,
            cursor: AtomicUsize::new(0),
            prefer_current,
        }
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Selects an executor: the caller's own executor if `prefer_current`
    /// applies, otherwise the minimum-load executor found scanning one
    /// full rotation starting at the internal cursor, with an early
    /// stop the moment a zero-load executor is seen.
    pub fn acquire(&self) -> Arc<E> {
        assert!(!self.executors.is_empty(), "executor pool is empty");

        if self.prefer_current
            && let Some(mine) = self.executors.iter().find(|e| e.is_self_thread()) {
                return mine.clone();
            }

        let n = self.executors.len();
        let start = self.cursor.load(Ordering::Relaxed) % n;
        let mut best_idx = start;
        let mut best_load = u32::MAX;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let load = self.executors[idx].load();
            if load < best_load {
                best_load = load;
                best_idx = idx;
                if load == 0 {
                    break;
                }
            }
        }

        self.cursor.store((best_idx + 1) % n, Ordering::Relaxed);
        self.executors[best_idx].clone()
    }

    pub fn load_snapshot(&self) -> Vec<u32> {
        self.executors.iter().map(|e| e.load()).collect()
    }

    /// Submits a no-op to every executor and, once all have run it,
    /// reports each executor's queueing latency (submission to run).
    pub fn delay_probe(&self, report: impl FnOnce(Vec<Duration>) + Send + 'static) {
        let n = self.executors.len();
        if n == 0 {
            report(Vec::new());
            return;
        }
        let results = Arc::new(Mutex::new(vec![Duration::ZERO; n]));
        let remaining = Arc::new(AtomicU32::new(n as u32));
        let report = Arc::new(Mutex::new(Some(report)));

        for (idx, exec) in self.executors.iter().enumerate() {
            let results = results.clone();
            let remaining = remaining.clone();
            let report = report.clone();
            let submitted_at = Instant::now();
            exec.submit(
                Box::new(move || {
                    results.lock().unwrap()[idx] = submitted_at.elapsed();
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1
                        && let Some(cb) = report.lock().unwrap().take() {
                            cb(results.lock().unwrap().clone());
                        }
                }),
                false,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{Worker, WorkerHandle};
    use crate::util::ThreadPriority;
    use std::sync::mpsc;
    use std::time::Duration as StdDuration;

    fn pool_of(n: usize) -> (Vec<Worker>, ExecutorPool<WorkerHandle>) {
        let workers: Vec<Worker> = (0..n)
            .map(|_| Worker::spawn(ThreadPriority::Normal).unwrap())
            .collect();
        let handles = workers.iter().map(|w| Arc::new(w.handle())).collect();
        (workers, ExecutorPool::new(handles, false))
    }

    #[test]
    fn acquire_routes_to_least_loaded() {
        let (_workers, pool) = pool_of(2);
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        pool.acquire().submit(
            Box::new(move || {
                std::thread::sleep(StdDuration::from_millis(80));
                tx2.send(()).unwrap();
            }),
            false,
        );
        std::thread::sleep(StdDuration::from_millis(20));
        let second = pool.acquire();
        assert_eq!(second.load(), 0);
        rx.recv().unwrap();
    }

    #[test]
    fn load_snapshot_has_one_entry_per_executor() {
        let (_workers, pool) = pool_of(3);
        assert_eq!(pool.load_snapshot().len(), 3);
    }
}
