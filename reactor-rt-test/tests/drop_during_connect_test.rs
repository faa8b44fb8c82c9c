//! spec.md §3/§4.8.6/§9: dropping a `Socket` while a connect is still
//! pending must not invoke the user callback, and must not leak the
//! fd/timer the pending connect was holding onto.

use reactor_rt::executor::Executor;
use reactor_rt::reactor::Reactor;
use reactor_rt::util::ThreadPriority;
use reactor_rt::worker::Worker;
use reactor_rt::Socket;
use serial_test::serial;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn dropping_socket_mid_connect_silences_the_callback() {
    reactor_rt_test::init_tracing();

    let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
    let resolver = Worker::spawn(ThreadPriority::Normal).unwrap();
    let resolver_handle: Arc<dyn Executor> = Arc::new(resolver.handle());

    let (tx, rx) = mpsc::channel();
    {
        let socket = Socket::new(reactor.handle(), resolver_handle);
        socket.connect("192.0.2.253".to_string(), 80, move |err| tx.send(err).unwrap(), 5.0, None, 0);
        // Socket (and its only strong state handle) drops here, well
        // before either the 5s timeout or the blackholed peer ever
        // answers.
    }

    let result = rx.recv_timeout(Duration::from_millis(500));
    assert!(result.is_err(), "callback fired after its socket was dropped: {result:?}");
}
