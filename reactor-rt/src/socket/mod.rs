//! Non-blocking socket state machine (spec.md §4.8, ported from
//! `net/socket.h`/`.cpp` and `net/buffer.h`/`.cpp`).
//!
//! A [`Socket`] is bound to one reactor for its whole lifetime. All of
//! its private state (buffers, queues, callbacks) is touched only on
//! that reactor's loop thread — either because a call already runs
//! there, or because it was marshaled there via `submit`/`submit_first`
//! before mutating anything. [`SocketState`] therefore lives behind a
//! plain `RefCell` rather than a `Mutex`, wrapped in [`StateHandle`]
//! which asserts `Send` by fiat (the same pattern `Reactor` uses in
//! mayastor's core): the assertion is sound only because nothing ever
//! borrows it from two threads at once. `local_addr`/`peer_addr` are
//! the one place an arbitrary caller thread needs state computed on
//! the loop thread; they use `Executor::sync` to get there safely
//! instead of borrowing directly.

pub mod opts;

use crate::dns::DnsCache;
use crate::error::SockError;
use crate::executor::Executor;
use crate::reactor::{ReactorHandle, ERROR, READ, WRITE};
use crate::timer::Timer;
use bytes::Bytes;

use nix::sys::socket::{self, sockopt, MsgFlags, SockFlag, SockaddrStorage};
use socket2::{Domain, SockAddr, Socket as Socket2};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{BorrowedFd, FromRawFd, IntoRawFd, RawFd};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Reactor-confined handle to a [`SocketState`]. `Rc<RefCell<_>>` is
/// neither `Send` nor `Sync`, but every access is funneled through
/// reactor-posted closures or `Executor::sync`, so it never actually
/// crosses threads concurrently — only the type needs to claim it does,
/// so the closures that capture it can satisfy `Task`'s `Send` bound.
struct StateHandle(Rc<RefCell<SocketState>>);

unsafe impl Send for StateHandle {}

impl Clone for StateHandle {
    fn clone(&self) -> Self {
        StateHandle(self.0.clone())
    }
}

impl std::ops::Deref for StateHandle {
    type Target = RefCell<SocketState>;
    fn deref(&self) -> &RefCell<SocketState> {
        &self.0
    }
}

impl StateHandle {
    fn downgrade(&self) -> WeakStateHandle {
        WeakStateHandle(Rc::downgrade(&self.0))
    }
}

/// Weak counterpart of [`StateHandle`], held by every closure the
/// reactor/timer/resolver retains beyond the call that created it. A
/// [`Socket`] holds the only strong handle; once the last one drops,
/// `SocketState`'s fields (`sockfd`, `con_timer`) tear themselves down
/// via their own `Drop` impls and every retained closure's `upgrade`
/// starts failing, so an abandoned connect/read/write never reaches a
/// dangling socket or invokes a callback no one is listening for
/// (spec.md §3, §4.8.6, §9 — mirrors `task.rs`'s `TaskHandle`).
#[derive(Clone)]
struct WeakStateHandle(std::rc::Weak<RefCell<SocketState>>);

unsafe impl Send for WeakStateHandle {}

impl WeakStateHandle {
    fn upgrade(&self) -> Option<StateHandle> {
        self.0.upgrade().map(StateHandle)
    }
}

/// Largest gather vector passed to one `sendmsg`, mirroring the
/// original's `IOV_MAX` cap (spec.md §4.8.5 step 4).
const IOV_MAX: usize = 1024;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SockKind {
    Tcp,
    Udp,
}

/// RAII fd owner. Drop enforces spec.md §3's invariant: epoll interest
/// is removed *before* shutdown+close, both performed on the owning
/// reactor's loop thread (inline if already there, else marshaled —
/// `del_event` handles both cases transparently).
struct SocketFd {
    fd: RawFd,
    #[allow(dead_code)] // carried for parity with spec.md's SocketFd entity; TCP/UDP branch on SocketState::kind instead
    kind: SockKind,
    connected: bool,
    reactor: ReactorHandle,
}

impl SocketFd {
    fn new(fd: RawFd, kind: SockKind, reactor: ReactorHandle) -> SocketFd {
        SocketFd {
            fd,
            kind,
            connected: false,
            reactor,
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for SocketFd {
    fn drop(&mut self) {
        let fd = self.fd;
        let connected = self.connected;
        self.reactor.del_event(
            fd,
            Some(Box::new(move |_existed| {
                if connected {
                    let _ = socket::shutdown(fd, socket::Shutdown::Both);
                }
                unsafe {
                    nix::libc::close(fd);
                }
            })),
        );
    }
}

/// A scatter/gather send in flight: buffers in submission order plus a
/// byte offset into the first buffer (spec.md §3 `SendPacket`, ported
/// from `BufferList`/`BufferList::reoffset`).
struct SendPacket {
    buffers: VecDeque<Bytes>,
    head_offset: usize,
    addr: Option<SocketAddr>,
}

impl SendPacket {
    fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn iov_slices(&self, max: usize) -> Vec<IoSlice<'_>> {
        let mut out = Vec::with_capacity(self.buffers.len().min(max));
        for (i, buf) in self.buffers.iter().enumerate() {
            if out.len() >= max {
                break;
            }
            let slice: &[u8] = if i == 0 { &buf[self.head_offset..] } else { buf.as_ref() };
            out.push(IoSlice::new(slice));
        }
        out
    }

    /// Trims `n` bytes off the front, dropping buffers it fully
    /// consumes, exactly mirroring `BufferList::reoffset`.
    fn advance(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.buffers.front() else {
                break;
            };
            let front_remaining = front.len() - self.head_offset;
            if n < front_remaining {
                self.head_offset += n;
                n = 0;
            } else {
                n -= front_remaining;
                self.buffers.pop_front();
                self.head_offset = 0;
            }
        }
    }
}

type ConnectCbSlot = Arc<Mutex<Option<Box<dyn FnOnce(SockError) + Send>>>>;
type ErrorCb = Box<dyn FnMut(SockError) + Send>;
type ReadCb = Box<dyn FnMut(&[u8], Option<SocketAddr>) + Send>;
type FlushedCb = Box<dyn FnMut() -> bool + Send>;
type AcceptCb = Box<dyn FnMut(Socket) + Send>;

struct SocketState {
    kind: SockKind,
    sockfd: Option<SocketFd>,
    read_buf: Vec<u8>,
    recv_enabled: bool,
    waiting: Vec<(Bytes, Option<SocketAddr>)>,
    sending: VecDeque<SendPacket>,
    write_armed: bool,
    con_timer: Option<Timer>,
    on_error: Option<ErrorCb>,
    on_read: Option<ReadCb>,
    on_flushed: Option<FlushedCb>,
    on_accept: Option<AcceptCb>,
}

impl SocketState {
    fn new(kind: SockKind) -> Self {
        SocketState {
            kind,
            sockfd: None,
            read_buf: Vec::new(),
            recv_enabled: false,
            waiting: Vec::new(),
            sending: VecDeque::new(),
            write_armed: false,
            con_timer: None,
            on_error: None,
            on_read: None,
            on_flushed: None,
            on_accept: None,
        }
    }
}

/// A non-blocking TCP/UDP endpoint driven by one reactor. Cheap to
/// clone; clones share the same underlying fd and callbacks.
#[derive(Clone)]
pub struct Socket {
    reactor: ReactorHandle,
    resolver: Arc<dyn Executor>,
    state: StateHandle,
}

#[allow(dead_code)]
fn assert_send<T: Send>() {}
const _: fn() = assert_send::<Socket>;

impl Socket {
    pub fn new(reactor: ReactorHandle, resolver: Arc<dyn Executor>) -> Socket {
        Socket {
            reactor,
            resolver,
            state: StateHandle(Rc::new(RefCell::new(SocketState::new(SockKind::Tcp)))),
        }
    }

    pub fn on_error(&self, cb: impl FnMut(SockError) + Send + 'static) {
        self.state.borrow_mut().on_error = Some(Box::new(cb));
    }

    pub fn on_read(&self, cb: impl FnMut(&[u8], Option<SocketAddr>) + Send + 'static) {
        self.state.borrow_mut().on_read = Some(Box::new(cb));
    }

    /// `cb` returns `false` to stop being notified of future flush
    /// completions (spec.md §4.8.5 step 3).
    pub fn on_flushed(&self, cb: impl FnMut() -> bool + Send + 'static) {
        self.state.borrow_mut().on_flushed = Some(Box::new(cb));
    }

    pub fn on_accept(&self, cb: impl FnMut(Socket) + Send + 'static) {
        self.state.borrow_mut().on_accept = Some(Box::new(cb));
    }

    /// Connects to `host:port` (spec.md §4.8.2). `cb` fires exactly once
    /// with the final result, from either the timeout timer or the
    /// reactor's writability check, whichever resolves first.
    pub fn connect(
        &self,
        host: impl Into<String>,
        port: u16,
        cb: impl FnOnce(SockError) + Send + 'static,
        timeout_sec: f32,
        local_ip_or_iface: Option<String>,
        local_port: u16,
    ) {
        self.close();
        let host = host.into();

        let cb_slot: ConnectCbSlot = Arc::new(Mutex::new(Some(Box::new(cb))));

        let timeout_ms = (timeout_sec.max(0.0) * 1000.0) as u64;
        let timer_slot = cb_slot.clone();
        let timer = Timer::once(&self.reactor, timeout_ms, move || {
            if let Some(cb) = timer_slot.lock().unwrap().take() {
                cb(SockError::Timeout);
            }
        });
        self.state.borrow_mut().con_timer = Some(timer);

        let reactor = self.reactor.clone();
        let weak_state = self.state.downgrade();
        let result_cb_slot = cb_slot;
        self.resolver.submit(
            Box::new(move || {
                let result = resolve_and_connect(&host, port, local_ip_or_iface.as_deref(), local_port);
                let reactor2 = reactor.clone();
                let weak_state2 = weak_state.clone();
                let cb_slot2 = result_cb_slot.clone();
                reactor.submit(
                    Box::new(move || {
                        let Some(state2) = weak_state2.upgrade() else {
                            return;
                        };
                        on_connect_result(&reactor2, &state2, cb_slot2, result)
                    }),
                    true,
                );
            }),
            false,
        );
    }

    /// Listens for TCP connections or binds a UDP endpoint (spec.md
    /// §4.8.3).
    pub fn listen(
        &self,
        kind: SockKind,
        port: u16,
        ipv6: bool,
        local_ip_or_iface: Option<&str>,
        backlog: i32,
    ) -> Result<(), SockError> {
        self.close();
        let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
        let sock = match kind {
            SockKind::Tcp => opts::new_tcp_socket(domain),
            SockKind::Udp => opts::new_udp_socket(domain),
        }
        .map_err(|e| SockError::from_io(&e))?;

        let ip = opts::resolve_bind_address(local_ip_or_iface, ipv6).map_err(|e| SockError::from_io(&e))?;
        sock.bind(&SockAddr::from(SocketAddr::new(ip, port)))
            .map_err(|e| SockError::from_io(&e))?;
        if kind == SockKind::Tcp {
            sock.listen(backlog).map_err(|e| SockError::from_io(&e))?;
        }

        let fd = sock.into_raw_fd();
        self.state.borrow_mut().kind = kind;
        self.state.borrow_mut().sockfd = Some(SocketFd::new(fd, kind, self.reactor.clone()));

        if kind == SockKind::Udp {
            attach_duplex(self.reactor.clone(), &self.state, fd, kind);
            return Ok(());
        }

        let reactor = self.reactor.clone();
        let weak_state = self.state.downgrade();
        let resolver = self.resolver.clone();
        self.reactor.add_event(fd, READ | ERROR, move |mask| {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            if mask & ERROR != 0 {
                let err = read_so_error(fd);
                emit_err(&state, err);
                return;
            }
            accept_loop(&reactor, &state, &resolver, fd);
        });
        Ok(())
    }

    /// Appends `buf` to the send queue from any thread (spec.md §4.8.5).
    pub fn send(&self, buf: impl Into<Bytes>, addr: Option<SocketAddr>) {
        let buf = buf.into();
        let reactor = self.reactor.clone();
        let state = self.state.clone();
        self.reactor.submit_first(
            Box::new(move || {
                let fd = {
                    let mut s = state.borrow_mut();
                    let Some(fd) = s.sockfd.as_ref().map(SocketFd::raw_fd) else {
                        return;
                    };
                    s.waiting.push((buf, addr));
                    fd
                };
                let kind = state.borrow().kind;
                flush_socket(&reactor, &state, fd, kind);
            }),
            true,
        );
    }

    /// Tears down the socket (spec.md §4.8.6). Blocks until the
    /// teardown has actually run on the reactor thread, so that once
    /// this returns no further user callback will fire for this
    /// socket.
    pub fn close(&self) {
        let state = self.state.clone();
        self.reactor.sync(Box::new(move || {
            let mut s = state.borrow_mut();
            s.con_timer = None;
            s.sockfd = None;
            s.waiting.clear();
            s.sending.clear();
            s.write_armed = false;
            s.recv_enabled = false;
        }));
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.query_addr(socket::getsockname::<SockaddrStorage>)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.query_addr(socket::getpeername::<SockaddrStorage>)
    }

    fn query_addr(&self, query: impl Fn(RawFd) -> nix::Result<SockaddrStorage> + Send + 'static) -> Option<SocketAddr> {
        let result = Arc::new(Mutex::new(None));
        let result2 = result.clone();
        let state = self.state.clone();
        self.reactor.sync(Box::new(move || {
            let s = state.borrow();
            if let Some(fd) = s.sockfd.as_ref().map(SocketFd::raw_fd)
                && let Ok(addr) = query(fd) {
                    *result2.lock().unwrap() = to_std_addr(&addr);
                }
        }));
        result.lock().unwrap().take()
    }
}

fn resolve_and_connect(
    host: &str,
    port: u16,
    local: Option<&str>,
    local_port: u16,
) -> Result<Socket2, SockError> {
    let peer = DnsCache::global()
        .resolve(host, port, 60)
        .map_err(|_| SockError::Unreachable)?;
    let domain = if peer.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let sock = opts::new_tcp_socket(domain).map_err(|e| SockError::from_io(&e))?;

    let bind_ip = opts::resolve_bind_address(local, peer.is_ipv6()).map_err(|_| SockError::Unreachable)?;
    sock.bind(&SockAddr::from(SocketAddr::new(bind_ip, local_port)))
        .map_err(|e| SockError::from_io(&e))?;

    match sock.connect(&SockAddr::from(peer)) {
        Ok(()) => {}
        Err(e)
            if e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(nix::libc::EINPROGRESS) => {}
        Err(e) => return Err(SockError::from_io(&e)),
    }
    Ok(sock)
}

fn on_connect_result(
    reactor: &ReactorHandle,
    state: &StateHandle,
    cb_slot: ConnectCbSlot,
    result: Result<Socket2, SockError>,
) {
    let sock = match result {
        Ok(s) => s,
        Err(e) => {
            state.borrow_mut().con_timer = None;
            if let Some(cb) = cb_slot.lock().unwrap().take() {
                cb(e);
            }
            return;
        }
    };

    let fd = sock.into_raw_fd();
    state.borrow_mut().sockfd = Some(SocketFd::new(fd, SockKind::Tcp, reactor.clone()));

    let reactor2 = reactor.clone();
    let weak_state = state.downgrade();
    reactor.add_event(fd, WRITE, move |_mask| {
        let Some(cb) = cb_slot.lock().unwrap().take() else {
            // Already resolved by the timeout timer.
            return;
        };
        let Some(state2) = weak_state.upgrade() else {
            return;
        };
        state2.borrow_mut().con_timer = None;
        let err = read_so_error(fd);
        if err.is_success() {
            reactor2.del_event(fd, None);
            if let Some(sockfd) = state2.borrow_mut().sockfd.as_mut() {
                sockfd.connected = true;
            }
            attach_duplex(reactor2.clone(), &state2, fd, SockKind::Tcp);
            cb(SockError::Success);
        } else {
            emit_err(&state2, err.clone());
            cb(err);
        }
    });
}

fn accept_loop(
    reactor: &ReactorHandle,
    state: &StateHandle,
    resolver: &Arc<dyn Executor>,
    listen_fd: RawFd,
) {
    loop {
        match socket::accept4(listen_fd, SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC) {
            Ok(child_fd) => {
                let child_sock = unsafe { Socket2::from_raw_fd(child_fd) };
                if let Err(e) = opts::apply_accepted_defaults(&child_sock) {
                    tracing::warn!(error = %e, "failed to apply options to accepted socket");
                }
                let fd = child_sock.into_raw_fd();

                let child = Socket::new(reactor.clone(), resolver.clone());
                {
                    let mut cs = child.state.borrow_mut();
                    let mut sockfd = SocketFd::new(fd, SockKind::Tcp, reactor.clone());
                    sockfd.connected = true;
                    cs.sockfd = Some(sockfd);
                }

                let cb = state.borrow_mut().on_accept.take();
                if let Some(mut cb_fn) = cb {
                    cb_fn(child.clone());
                    state.borrow_mut().on_accept = Some(cb_fn);
                }

                attach_duplex(reactor.clone(), &child.state, fd, SockKind::Tcp);
            }
            Err(nix::errno::Errno::EAGAIN) => return,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                return;
            }
        }
    }
}

/// Registers `fd` for full-duplex READ|WRITE|ERROR dispatch (spec.md
/// §4.8.3/§4.8.4, ported from `Socket::attach_event`). The dispatch
/// closure outlives this call (it runs for as long as the fd stays
/// registered), so it captures only a weak handle — an abandoned
/// socket stops being serviced instead of being kept alive by its own
/// reactor registration.
fn attach_duplex(reactor: ReactorHandle, state: &StateHandle, fd: RawFd, kind: SockKind) {
    {
        let mut s = state.borrow_mut();
        s.recv_enabled = true;
        // WRITE is armed at the epoll level below from the start, so
        // the flag must agree immediately rather than waiting for the
        // first EAGAIN/partial write to set it.
        s.write_armed = true;
        if s.read_buf.is_empty() {
            s.read_buf = vec![0u8; if kind == SockKind::Udp { 0xFFFF } else { 128 * 1024 }];
        }
    }
    let weak_state = state.downgrade();
    let reactor2 = reactor.clone();
    reactor.add_event(fd, READ | WRITE | ERROR, move |mask| {
        let Some(state) = weak_state.upgrade() else {
            return;
        };
        if mask & ERROR != 0 {
            let err = read_so_error(fd);
            emit_err(&state, err);
            return;
        }
        if mask & READ != 0 {
            handle_read(&state, fd, kind);
        }
        if mask & WRITE != 0 {
            flush_socket(&reactor2, &state, fd, kind);
        }
    });
}

fn handle_read(state: &StateHandle, fd: RawFd, kind: SockKind) {
    loop {
        if !state.borrow().recv_enabled {
            return;
        }

        let outcome = {
            let mut s = state.borrow_mut();
            let buf = &mut s.read_buf;
            loop {
                match socket::recvfrom::<SockaddrStorage>(fd, buf) {
                    Ok(v) => break Ok(v),
                    Err(nix::errno::Errno::EINTR) => continue,
                    Err(e) => break Err(e),
                }
            }
        };

        match outcome {
            Ok((0, _)) => {
                if kind == SockKind::Tcp {
                    emit_err(state, SockError::Eof);
                    return;
                }
                // A zero-length UDP datagram carries no EOF meaning;
                // under edge-triggered readiness the drain loop must
                // keep going or later-queued datagrams never get read.
                continue;
            }
            Ok((n, peer)) => {
                let addr = peer.as_ref().and_then(to_std_addr);
                let data = state.borrow().read_buf[..n].to_vec();
                let cb = state.borrow_mut().on_read.take();
                if let Some(mut cb_fn) = cb {
                    cb_fn(&data, addr);
                    state.borrow_mut().on_read = Some(cb_fn);
                }
            }
            Err(e) => {
                let err = SockError::from_io(&io::Error::from(e));
                if !err.is_success() {
                    emit_err(state, err);
                }
                return;
            }
        }
    }
}

/// Drains `sending`, promoting `waiting` into a new packet when empty
/// (spec.md §4.8.5).
fn flush_socket(reactor: &ReactorHandle, state: &StateHandle, fd: RawFd, kind: SockKind) {
    loop {
        let have_sending = !state.borrow().sending.is_empty();
        if !have_sending {
            let have_waiting = !state.borrow().waiting.is_empty();
            if have_waiting {
                promote_waiting(&mut state.borrow_mut(), kind);
                continue;
            }

            let was_armed = {
                let mut s = state.borrow_mut();
                std::mem::replace(&mut s.write_armed, false)
            };
            if was_armed {
                reactor.modify_event(fd, READ | ERROR);
            }

            let cb = state.borrow_mut().on_flushed.take();
            if let Some(mut cb_fn) = cb
                && cb_fn() {
                    state.borrow_mut().on_flushed = Some(cb_fn);
                }
            return;
        }

        let max_iov = if kind == SockKind::Udp { 1 } else { IOV_MAX };
        let send_result = {
            let s = state.borrow();
            let packet = s.sending.front().expect("have_sending checked above");
            let iovs = packet.iov_slices(max_iov);
            send_once(fd, &iovs, packet.addr)
        };

        match send_result {
            Ok(n) => {
                let mut s = state.borrow_mut();
                let packet = s.sending.front_mut().expect("have_sending checked above");
                packet.advance(n);
                if packet.is_empty() {
                    s.sending.pop_front();
                    continue;
                }
                s.write_armed = true;
                drop(s);
                reactor.modify_event(fd, READ | WRITE | ERROR);
                return;
            }
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                let err = SockError::from_io(&io::Error::from(e));
                if err.is_success() {
                    state.borrow_mut().write_armed = true;
                    reactor.modify_event(fd, READ | WRITE | ERROR);
                    return;
                }
                emit_err(state, err);
                return;
            }
        }
    }
}

fn promote_waiting(s: &mut SocketState, kind: SockKind) {
    if kind == SockKind::Udp {
        for (buf, addr) in s.waiting.drain(..) {
            let mut bufs = VecDeque::new();
            bufs.push_back(buf);
            s.sending.push_back(SendPacket {
                buffers: bufs,
                head_offset: 0,
                addr,
            });
        }
    } else {
        let buffers: VecDeque<Bytes> = s.waiting.drain(..).map(|(b, _)| b).collect();
        s.sending.push_back(SendPacket {
            buffers,
            head_offset: 0,
            addr: None,
        });
    }
}

fn emit_err(state: &StateHandle, err: SockError) {
    let should_fire = {
        let mut s = state.borrow_mut();
        if s.sockfd.is_none() {
            false
        } else {
            s.sockfd = None;
            s.con_timer = None;
            true
        }
    };
    if !should_fire {
        return;
    }
    let cb = state.borrow_mut().on_error.take();
    if let Some(mut cb_fn) = cb {
        cb_fn(err);
        state.borrow_mut().on_error = Some(cb_fn);
    }
}

fn send_once(fd: RawFd, iovs: &[IoSlice<'_>], addr: Option<SocketAddr>) -> nix::Result<usize> {
    match addr {
        Some(a) => {
            let storage = to_sockaddr_storage(a);
            socket::sendmsg(fd, iovs, &[], MsgFlags::MSG_NOSIGNAL, Some(&storage))
        }
        None => socket::sendmsg::<SockaddrStorage>(fd, iovs, &[], MsgFlags::MSG_NOSIGNAL, None),
    }
}

fn read_so_error(fd: RawFd) -> SockError {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    match socket::getsockopt(&borrowed, sockopt::SocketError) {
        Ok(0) => SockError::Success,
        Ok(errno) => SockError::from_io(&io::Error::from_raw_os_error(errno)),
        Err(e) => SockError::from_io(&io::Error::from(e)),
    }
}

fn to_std_addr(storage: &SockaddrStorage) -> Option<SocketAddr> {
    if let Some(v4) = storage.as_sockaddr_in() {
        Some(SocketAddr::V4(SocketAddrV4::new(v4.ip(), v4.port())))
    } else { storage.as_sockaddr_in6().map(|v6| SocketAddr::V6(SocketAddrV6::new(v6.ip(), v6.port(), 0, 0))) }
}

fn to_sockaddr_storage(addr: SocketAddr) -> SockaddrStorage {
    match addr {
        SocketAddr::V4(v4) => SockaddrStorage::from(v4),
        SocketAddr::V6(v6) => SockaddrStorage::from(v6),
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
const _: fn() = assert_send_sync::<ReactorHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    /// spec.md §8 scenario 5: 1000 one-byte sends queued before the fd
    /// is writable must promote into a single packet whose iov spans
    /// more than one buffer, not a flush per buffer.
    #[test]
    fn promote_waiting_coalesces_many_buffers_into_one_packet() {
        let mut state = SocketState::new(SockKind::Tcp);
        for _ in 0..1000 {
            state.waiting.push((Bytes::from_static(b"x"), None));
        }

        promote_waiting(&mut state, SockKind::Tcp);

        assert_eq!(state.sending.len(), 1, "all waiting buffers must coalesce into one packet");
        let packet = &state.sending[0];
        assert_eq!(packet.buffers.len(), 1000);

        let iovs = packet.iov_slices(IOV_MAX);
        assert!(iovs.len() >= 2, "first flush must see an iov of length >= 2, got {}", iovs.len());
        let total: usize = iovs.iter().map(|s| s.len()).sum();
        assert!(total >= 2);
    }

    /// spec.md §4.4.3/§4.8.4: under edge-triggered readiness a
    /// zero-length UDP datagram must not abort the drain loop, or a
    /// datagram queued right behind it in the same READ notification
    /// is lost until some unrelated later readiness transition.
    #[test]
    fn zero_length_udp_datagram_does_not_stall_the_drain_loop() {
        use socket2::{Domain, Socket as Socket2, Type};
        use std::net::SocketAddr as StdSocketAddr;
        use std::os::fd::AsRawFd;

        let receiver = Socket2::new(Domain::IPV4, Type::DGRAM, None).unwrap();
        receiver.bind(&SockAddr::from("127.0.0.1:0".parse::<StdSocketAddr>().unwrap())).unwrap();
        receiver.set_nonblocking(true).unwrap();
        let receiver_addr = receiver.local_addr().unwrap().as_socket().unwrap();

        let sender = Socket2::new(Domain::IPV4, Type::DGRAM, None).unwrap();
        sender.bind(&SockAddr::from("127.0.0.1:0".parse::<StdSocketAddr>().unwrap())).unwrap();
        sender.send_to(&[], &SockAddr::from(receiver_addr)).unwrap();
        sender.send_to(b"hi", &SockAddr::from(receiver_addr)).unwrap();

        let state = StateHandle(Rc::new(RefCell::new(SocketState::new(SockKind::Udp))));
        state.borrow_mut().recv_enabled = true;
        state.borrow_mut().read_buf = vec![0u8; 0xFFFF];

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        state.borrow_mut().on_read = Some(Box::new(move |data, _addr| {
            received2.lock().unwrap().push(data.to_vec());
        }));

        handle_read(&state, receiver.as_raw_fd(), SockKind::Udp);

        assert_eq!(received.lock().unwrap().as_slice(), &[b"hi".to_vec()], "datagram after an empty one must still be delivered");
    }

    #[test]
    fn send_packet_advance_trims_and_drops_consumed_buffers() {
        let mut packet = SendPacket {
            buffers: VecDeque::from([Bytes::from_static(b"abc"), Bytes::from_static(b"de")]),
            head_offset: 0,
            addr: None,
        };
        packet.advance(4);
        assert_eq!(packet.buffers.len(), 1);
        assert_eq!(packet.head_offset, 1);
        assert_eq!(&packet.buffers[0][packet.head_offset..], b"e");
    }
}
