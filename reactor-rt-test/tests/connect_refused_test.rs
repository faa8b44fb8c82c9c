//! spec.md §8 scenario 2: connect refused.

use reactor_rt::executor::Executor;
use reactor_rt::reactor::Reactor;
use reactor_rt::util::ThreadPriority;
use reactor_rt::worker::Worker;
use reactor_rt::{SockError, Socket};
use serial_test::serial;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn connect_to_closed_port_is_refused_within_one_second() {
    reactor_rt_test::init_tracing();

    let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
    let resolver = Worker::spawn(ThreadPriority::Normal).unwrap();
    let resolver_handle: Arc<dyn Executor> = Arc::new(resolver.handle());

    let socket = Socket::new(reactor.handle(), resolver_handle);
    let (tx, rx) = mpsc::channel();

    socket.connect("127.0.0.1".to_string(), 1, move |err| tx.send(err).unwrap(), 5.0, None, 0);

    let result = rx.recv_timeout(Duration::from_secs(1)).expect("connect callback did not fire in time");
    assert_eq!(result, SockError::Refused);
}
