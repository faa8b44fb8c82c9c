//! Epoll-driven reactor, worker pool, and non-blocking socket runtime.
//!
//! See the individual modules for the pieces: [`reactor`] and [`worker`]
//! are the two [`executor::Executor`] implementations, [`pool`] fans
//! work out across a fixed set of them, [`socket`] is the state machine
//! driven by a reactor, and [`timer`]/[`dns`] are the supporting
//! facilities built on top.

pub mod dns;
pub mod error;
pub mod executor;
pub mod load;
pub mod pipe;
pub mod pool;
pub mod queue;
pub mod reactor;
pub mod semaphore;
pub mod socket;
pub mod task;
pub mod timer;
pub mod util;
pub mod worker;

pub use error::SockError;
pub use executor::{current_reactor, Executor};
pub use pool::ExecutorPool;
pub use reactor::{Reactor, ReactorHandle};
pub use socket::{SockKind, Socket};
pub use timer::Timer;
pub use worker::{Worker, WorkerHandle};
