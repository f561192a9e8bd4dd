//! Single-threaded readiness event loop.
//!
//! One loop owns its listener, poll instance and connection slab; no
//! state is shared across threads except the immutable router and the
//! wakeup handle. Edge-triggered readiness drives everything: accept
//! until the listener would block, read each socket to exhaustion, park
//! unfinished writes behind writable interest. For multi-core service,
//! bind one loop per core with `reuse_port` enabled and let the kernel
//! spread connections.
//!
//! Shutdown never interrupts a syscall: [`ShutdownHandle::shutdown`]
//! fires the poll's wakeup token from any thread, the loop observes it
//! between events, drains and closes.

use crate::errors::{DecodeError, SocketError};
use crate::http::date::DateStamp;
use crate::http::request_line::RequestLine;
use crate::http::response::Response;
use crate::http::types::Version;
use crate::limits::EngineLimits;
use crate::router::matcher::Router;
use crate::router::route::Dispatch;
use crate::server::conn::{Completion, Connection, ReadStatus, WriteProgress};
use crate::server::slab::ConnSlab;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const LISTENER: Token = Token(usize::MAX - 1);
const WAKE: Token = Token(usize::MAX);

/// Lifecycle of one event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Bound and registered, not yet polling.
    Listening,
    /// Inside [`EventLoop::run`].
    Running,
    /// Wakeup observed; closing out.
    Draining,
    /// All sockets closed; `run` has returned.
    Closed,
}

/// Cloneable cross-thread shutdown trigger for one event loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Requests shutdown. Returns once the wakeup is delivered; the
    /// loop drains on its own schedule.
    pub fn shutdown(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

pub struct EventLoop {
    poll: Poll,
    listener: mio::net::TcpListener,
    waker: Arc<Waker>,
    conns: ConnSlab,
    router: Arc<Router>,
    limits: EngineLimits,
    date: DateStamp,
    state: LoopState,
    local_addr: SocketAddr,
}

impl EventLoop {
    /// Binds a non-blocking listener and registers it for readiness.
    ///
    /// The socket is configured through `socket2` before it becomes a
    /// listener: `SO_REUSEADDR` always, `SO_REUSEPORT` when the limits
    /// ask for per-core replicas.
    pub fn bind(addr: SocketAddr, router: Arc<Router>, limits: EngineLimits) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if limits.reuse_port {
            socket.set_reuse_port(true)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(limits.backlog as i32)?;

        let mut listener = mio::net::TcpListener::from_std(socket.into());
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);

        debug!(%local_addr, "listener bound");

        Ok(Self {
            poll,
            listener,
            waker,
            conns: ConnSlab::with_capacity(limits.max_connections),
            router,
            limits,
            date: DateStamp::now(),
            state: LoopState::Listening,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Polls and dispatches until a shutdown wakeup arrives, then
    /// drains every connection and returns.
    pub fn run(&mut self) -> io::Result<()> {
        self.state = LoopState::Running;
        let mut events = Events::with_capacity(1024);

        while self.state == LoopState::Running {
            // At most one date render per iteration; every response in
            // this iteration reuses it.
            self.date.refresh();

            if let Err(e) = self.poll.poll(&mut events, self.limits.poll_timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    WAKE => self.state = LoopState::Draining,
                    LISTENER => self.accept_ready(),
                    Token(idx) => self.conn_ready(idx, event.is_writable(), event.is_readable()),
                }
            }
        }

        let _ = self.poll.registry().deregister(&mut self.listener);
        for mut conn in self.conns.drain() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        self.state = LoopState::Closed;
        debug!("event loop drained");
        Ok(())
    }

    /// Accepts until the listener would block. Accept errors are logged
    /// and the attempt dropped; they never take the loop down.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.limits.nodelay {
                        let _ = stream.set_nodelay(true);
                    }
                    match self.conns.insert(Connection::new(stream)) {
                        Some(idx) => {
                            let conn = match self.conns.get_mut(idx) {
                                Some(conn) => conn,
                                None => continue,
                            };
                            if let Err(e) = self.poll.registry().register(
                                &mut conn.stream,
                                Token(idx),
                                Interest::READABLE,
                            ) {
                                warn!(error = %e, "register failed, dropping connection");
                                self.conns.remove(idx);
                            } else {
                                trace!(%peer, token = idx, "accepted");
                            }
                        }
                        None => {
                            warn!(capacity = self.limits.max_connections, "slab full, dropping connection");
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %SocketError::AcceptFailed(e), "listener error");
                    break;
                }
            }
        }
    }

    fn conn_ready(&mut self, idx: usize, writable: bool, readable: bool) {
        if writable {
            let conn = match self.conns.get_mut(idx) {
                Some(conn) => conn,
                None => return,
            };
            if conn.pending.is_some() {
                match conn.continue_write() {
                    Ok(WriteProgress::Done) => self.finish_write(idx),
                    Ok(WriteProgress::Blocked) => return,
                    Err(e) => {
                        debug!(token = idx, error = %e, "write failed");
                        self.close(idx);
                        return;
                    }
                }
            }
        }

        if readable {
            let conn = match self.conns.get_mut(idx) {
                Some(conn) => conn,
                None => return,
            };
            // A response still in flight parks the connection; with
            // pipelining out of scope there is nothing to read yet.
            if conn.pending.is_some() {
                return;
            }
            match conn.read_ready() {
                Ok(ReadStatus::Complete) => self.dispatch(idx),
                Ok(ReadStatus::Partial) => {}
                Ok(ReadStatus::Closed) => {
                    // Peer went away quietly; so do we.
                    trace!(token = idx, "peer closed");
                    self.close(idx);
                }
                Ok(ReadStatus::Overflow) => {
                    debug!(token = idx, "request exceeds buffer capacity");
                    self.close(idx);
                }
                Err(e) => {
                    debug!(token = idx, error = %e, "read failed");
                    self.close(idx);
                }
            }
        }
    }

    fn dispatch(&mut self, idx: usize) {
        let router = Arc::clone(&self.router);
        let conn = match self.conns.get_mut(idx) {
            Some(conn) => conn,
            None => return,
        };

        let line = match RequestLine::decode(conn.buf.as_slice()) {
            Ok(line) => line,
            Err(DecodeError::MalformedRequest) | Err(DecodeError::UnsupportedVersion) => {
                // No response for bytes we cannot frame.
                trace!(token = idx, "malformed request line");
                self.close(idx);
                return;
            }
        };
        if !line.version.is_served() {
            debug!(token = idx, version = ?line.version, "unsupported protocol version");
            self.close(idx);
            return;
        }

        let mut rsp = Response::new();
        rsp.set_version(line.version);

        match router.dispatch(conn.buf.as_slice(), line, &mut rsp) {
            Dispatch::Done => {
                conn.close_after_write = line.version == Version::Http10 || rsp.streams();
                let date = if self.limits.send_date {
                    Some(&self.date)
                } else {
                    None
                };
                let encoded = rsp.encode(date);

                match conn.start_write(&encoded, date) {
                    Ok(WriteProgress::Done) => self.finish_write(idx),
                    Ok(WriteProgress::Blocked) => {
                        let wants = Interest::READABLE | Interest::WRITABLE;
                        if let Err(e) =
                            self.poll
                                .registry()
                                .reregister(&mut conn.stream, Token(idx), wants)
                        {
                            warn!(token = idx, error = %e, "reregister failed");
                            self.close(idx);
                        }
                    }
                    Err(e) => {
                        debug!(token = idx, error = %e, "write failed");
                        self.close(idx);
                    }
                }
            }
            Dispatch::Deferred(complete) => {
                if let Some(mut conn) = self.conns.remove(idx) {
                    let _ = self.poll.registry().deregister(&mut conn.stream);
                    complete(Completion::from_mio(conn.stream, line.version));
                }
            }
        }
    }

    /// Disposition after a fully written response: close, or rearm the
    /// connection for the next request.
    fn finish_write(&mut self, idx: usize) {
        let close = match self.conns.get_mut(idx) {
            Some(conn) => conn.close_after_write,
            None => return,
        };

        if close {
            self.close(idx);
            return;
        }

        if let Some(conn) = self.conns.get_mut(idx) {
            conn.buf.clear();
            if let Err(e) =
                self.poll
                    .registry()
                    .reregister(&mut conn.stream, Token(idx), Interest::READABLE)
            {
                warn!(token = idx, error = %e, "reregister failed");
                self.close(idx);
            }
        }
    }

    fn close(&mut self, idx: usize) {
        if let Some(mut conn) = self.conns.remove(idx) {
            if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
                debug!(token = idx, error = %SocketError::CloseFailed(e), "deregister failed");
            }
        }
    }

    /// Live connection count, for observability and tests.
    pub fn connections(&self) -> usize {
        self.conns.len()
    }
}

#[cfg(test)]
mod loopback {
    use super::*;
    use crate::router::route::Route;
    use crate::StatusCode;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn quiet_limits() -> EngineLimits {
        init_tracing();
        EngineLimits {
            send_date: false,
            poll_timeout: Some(Duration::from_millis(50)),
            ..EngineLimits::default()
        }
    }

    fn pong_router() -> Arc<Router> {
        Arc::new(
            Router::builder()
                .route(Route::new("GET", "/ping", |_req: &crate::Request<'_>,
                                                   rsp: &mut Response| {
                    rsp.body(b"pong".to_vec());
                    Dispatch::Done
                }))
                .build()
                .unwrap(),
        )
    }

    fn spawn_loop(
        router: Arc<Router>,
    ) -> (SocketAddr, ShutdownHandle, thread::JoinHandle<io::Result<()>>) {
        let mut el = EventLoop::bind("127.0.0.1:0".parse().unwrap(), router, quiet_limits())
            .unwrap();
        let addr = el.local_addr();
        let handle = el.shutdown_handle();
        let join = thread::spawn(move || el.run());
        (addr, handle, join)
    }

    #[test]
    fn serves_and_closes_http10() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"GET /ping HTTP/1.0\r\n\r\n").unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).unwrap();
        assert_eq!(rsp, b"HTTP/1.0 200\r\ncontent-length: 4\r\n\r\npong");

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn keep_alive_serves_sequential_requests() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let expected = b"HTTP/1.1 200\r\ncontent-length: 4\r\n\r\npong";
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        for _ in 0..3 {
            stream.write_all(b"GET /ping HTTP/1.1\r\n\r\n").unwrap();
            let mut got = vec![0u8; expected.len()];
            stream.read_exact(&mut got).unwrap();
            assert_eq!(got, expected);
        }

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn two_sockets_progress_independently() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let expected = b"HTTP/1.1 200\r\ncontent-length: 4\r\n\r\npong";
        let mut a = TcpStream::connect(addr).unwrap();
        let mut b = TcpStream::connect(addr).unwrap();
        a.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        b.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Socket A stalls mid-request; socket B must still be served.
        a.write_all(b"GET /pi").unwrap();
        b.write_all(b"GET /ping HTTP/1.1\r\n\r\n").unwrap();

        let mut got = vec![0u8; expected.len()];
        b.read_exact(&mut got).unwrap();
        assert_eq!(got, expected);

        // A finishes late and is still served.
        a.write_all(b"ng HTTP/1.1\r\n\r\n").unwrap();
        a.read_exact(&mut got).unwrap();
        assert_eq!(got, expected);

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn malformed_request_closes_without_a_response() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(b"BOGUS\r\n\r\n").unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).unwrap();
        assert!(rsp.is_empty());

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn unknown_path_gets_the_fallback() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"GET /nope HTTP/1.0\r\n\r\n").unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).unwrap();
        assert_eq!(rsp, b"HTTP/1.0 404\r\ncontent-length: 0\r\n\r\n");

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn shutdown_drains_parked_connections() {
        let (addr, handle, join) = spawn_loop(pong_router());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(b"GET /pi").unwrap();

        // Let the loop register the half-sent request, then shut down.
        thread::sleep(Duration::from_millis(100));
        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).unwrap();
        assert!(rsp.is_empty());
    }

    #[test]
    fn deferred_responder_completes_off_loop() {
        let router = Arc::new(
            Router::builder()
                .route(Route::new("GET", "/later", |_req: &crate::Request<'_>,
                                                    _rsp: &mut Response| {
                    Dispatch::Deferred(Box::new(|completion: Completion| {
                        thread::spawn(move || {
                            thread::sleep(Duration::from_millis(50));
                            let mut rsp = Response::new();
                            rsp.status(StatusCode::Accepted).body(b"done".to_vec());
                            completion.send(&mut rsp).unwrap();
                        });
                    }))
                }))
                .build()
                .unwrap(),
        );
        let (addr, handle, join) = spawn_loop(router);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(b"GET /later HTTP/1.1\r\n\r\n").unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).unwrap();
        let text = String::from_utf8(rsp).unwrap();
        assert!(text.starts_with("HTTP/1.1 202\r\n"));
        assert!(text.ends_with("done"));

        handle.shutdown().unwrap();
        join.join().unwrap().unwrap();
    }
}
