//! spec.md §8 scenario 5: coalesced writev.

use reactor_rt::executor::Executor;
use reactor_rt::reactor::Reactor;
use reactor_rt::util::ThreadPriority;
use reactor_rt::worker::Worker;
use reactor_rt::Socket;
use serial_test::serial;
use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[test]
#[serial]
fn thousand_one_byte_sends_are_all_delivered() {
    reactor_rt_test::init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
    let resolver = Worker::spawn(ThreadPriority::Normal).unwrap();
    let resolver_handle: Arc<dyn Executor> = Arc::new(resolver.handle());

    let socket = Socket::new(reactor.handle(), resolver_handle);
    let (connected_tx, connected_rx) = mpsc::channel();
    socket.connect("127.0.0.1".to_string(), port, move |err| connected_tx.send(err).unwrap(), 5.0, None, 0);

    let (mut peer, _addr) = listener.accept().unwrap();
    connected_rx.recv_timeout(Duration::from_secs(1)).expect("connect did not complete in time");

    for _ in 0..1000 {
        socket.send(vec![b'x'], None);
    }

    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut received = 0usize;
    let mut buf = [0u8; 4096];
    while received < 1000 {
        let n = peer.read(&mut buf).expect("read from peer failed before all bytes arrived");
        assert!(n > 0, "peer saw EOF before receiving all 1000 bytes");
        received += n;
    }
    assert_eq!(received, 1000);
}
