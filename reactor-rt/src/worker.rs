//! A single-threaded task executor with no I/O multiplexing, for
//! CPU-bound or blocking work that must not run on a reactor thread
//! (spec.md §4.5, ported from `thread/worker.h`).

use crate::executor::Executor;
use crate::load::LoadCounter;
use crate::queue::TaskQueue;
use crate::util::{self, ThreadPriority};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

struct Inner {
    queue: TaskQueue<Box<dyn FnOnce() + Send>>,
    load: LoadCounter,
    loop_thread: std::sync::Mutex<Option<ThreadId>>,
}

#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<Inner>,
}

pub struct Worker {
    handle: WorkerHandle,
    join: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(priority: ThreadPriority) -> std::io::Result<Worker> {
        let inner = Arc::new(Inner {
            queue: TaskQueue::new(),
            load: LoadCounter::new(32, Duration::from_secs(2)),
            loop_thread: std::sync::Mutex::new(None),
        });
        let handle = WorkerHandle { inner };
        let run_handle = handle.clone();
        let join = std::thread::Builder::new()
            .name("worker".into())
            .spawn(move || {
                util::set_thread_priority(priority);
                *run_handle.inner.loop_thread.lock().unwrap() = Some(std::thread::current().id());
                run_handle.run();
            })?;
        Ok(Worker {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn shutdown_and_join(mut self) {
        self.handle.inner.queue.poison(1);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.handle.inner.queue.poison(1);
            if let Some(j) = self.join.take() {
                let _ = j.join();
            }
        }
    }
}

impl WorkerHandle {
    fn run(&self) {
        tracing::debug!("worker loop starting");
        loop {
            self.inner.load.going_idle();
            let Some(task) = self.inner.queue.pop() else {
                break;
            };
            self.inner.load.going_busy();
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                tracing::warn!(?panic, "worker task panicked, continuing");
            }
        }
        tracing::debug!("worker loop exiting");
    }

    fn is_loop_thread(&self) -> bool {
        *self.inner.loop_thread.lock().unwrap() == Some(std::thread::current().id())
    }
}

impl Executor for WorkerHandle {
    fn submit(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool) {
        if prefer_inline && self.is_loop_thread() {
            task();
            return;
        }
        self.inner.queue.push_back(task);
    }

    fn submit_first(&self, task: Box<dyn FnOnce() + Send>, prefer_inline: bool) {
        if prefer_inline && self.is_loop_thread() {
            task();
            return;
        }
        self.inner.queue.push_front(task);
    }

    fn load(&self) -> u32 {
        self.inner.load.load()
    }

    fn is_self_thread(&self) -> bool {
        self.is_loop_thread()
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
const _: fn() = assert_send_sync::<WorkerHandle>;
