//! spec.md §8 scenario 1: periodic timer.

use reactor_rt::reactor::Reactor;
use reactor_rt::util::ThreadPriority;
use reactor_rt::Timer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn periodic_timer_fires_roughly_every_period() {
    reactor_rt_test::init_tracing();

    let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
    let counter = Arc::new(AtomicU32::new(0));
    let counter2 = counter.clone();

    let timer = Timer::periodic(&reactor.handle(), 10, false, move || {
        counter2.fetch_add(1, Ordering::SeqCst);
    });

    std::thread::sleep(Duration::from_millis(105));
    timer.cancel();

    let n = counter.load(Ordering::SeqCst);
    assert!((8..=12).contains(&n), "expected counter in [8, 12], got {n}");
}
