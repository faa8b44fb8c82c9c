//! spec.md §8 scenario 4: echo.

use reactor_rt::executor::Executor;
use reactor_rt::reactor::Reactor;
use reactor_rt::util::ThreadPriority;
use reactor_rt::worker::Worker;
use reactor_rt::{SockError, SockKind, Socket};
use serial_test::serial;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
#[serial]
fn accepted_connection_echoes_bytes_back_then_sees_eof() {
    reactor_rt_test::init_tracing();

    let reactor = Reactor::spawn(ThreadPriority::Normal).unwrap();
    let resolver = Worker::spawn(ThreadPriority::Normal).unwrap();
    let resolver_handle: Arc<dyn Executor> = Arc::new(resolver.handle());

    let server = Socket::new(reactor.handle(), resolver_handle.clone());
    server.listen(SockKind::Tcp, 0, false, None, 16).unwrap();
    let port = server.local_addr().unwrap().port();

    let (eof_tx, eof_rx) = mpsc::channel();
    let accepted: Arc<Mutex<Option<Socket>>> = Arc::new(Mutex::new(None));
    let accepted2 = accepted.clone();

    server.on_accept(move |conn| {
        let writer = conn.clone();
        conn.on_read(move |data, _addr| {
            writer.send(data.to_vec(), None);
        });
        let eof_tx = eof_tx.clone();
        conn.on_error(move |err| {
            if err == SockError::Eof {
                eof_tx.send(()).unwrap();
            }
        });
        *accepted2.lock().unwrap() = Some(conn);
    });

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(b"hello").unwrap();

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    client.shutdown(std::net::Shutdown::Write).unwrap();
    eof_rx.recv_timeout(Duration::from_secs(1)).expect("server did not observe EOF in time");
}
