//! Queue-based worker-pool runtime.
//!
//! The alternative to the readiness loop for async deployments: a fixed
//! set of long-lived worker tasks is spawned once, all accepted sockets
//! go through one lock-free admission queue, and workers pull from it
//! with a configurable wait strategy. No task is ever created per
//! connection. When the queue is full the connection receives an
//! immediate `503` and is closed.

use crate::buf::{InlineBuf, INLINE_CAPACITY};
use crate::http::date::DateStamp;
use crate::http::request_line::RequestLine;
use crate::http::response::{Response, RAW_503};
use crate::http::types::Version;
use crate::limits::{PoolLimits, WaitStrategy};
use crate::router::matcher::Router;
use crate::router::route::Dispatch;
use crate::server::conn::Completion;
use crossbeam::queue::SegQueue;
use memchr::memmem;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace, warn};

/// Worker-pool server over a tokio listener.
///
/// # Examples
///
/// ```no_run
/// use falcon_web::{Dispatch, PoolLimits, Route, Router, TaskPoolServer};
/// use std::sync::Arc;
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() {
///     let router = Arc::new(
///         Router::builder()
///             .route(Route::new("GET", "/ping", |_req, rsp| {
///                 rsp.body(b"pong".to_vec());
///                 Dispatch::Done
///             }))
///             .build()
///             .unwrap(),
///     );
///     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
///     TaskPoolServer::new(listener, router, PoolLimits::default())
///         .launch()
///         .await;
/// }
/// ```
pub struct TaskPoolServer {
    listener: TcpListener,
    router: Arc<Router>,
    limits: PoolLimits,
}

impl TaskPoolServer {
    pub fn new(listener: TcpListener, router: Arc<Router>, limits: PoolLimits) -> Self {
        Self {
            listener,
            router,
            limits,
        }
    }

    /// Accepts forever.
    pub async fn launch(self) {
        self.launch_until(std::future::pending::<()>()).await
    }

    /// Accepts until `shutdown` resolves, then stops admitting. Workers
    /// finish their current connection and idle until the runtime goes
    /// away.
    pub async fn launch_until<F: Future<Output = ()>>(self, shutdown: F) {
        let queue: Arc<SegQueue<TcpStream>> = Arc::new(SegQueue::new());

        for _ in 0..self.limits.workers.max(1) {
            tokio::spawn(worker(
                Arc::clone(&queue),
                Arc::clone(&self.router),
                self.limits.wait_strategy.clone(),
            ));
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("admission stopped");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if queue.len() >= self.limits.max_pending_connections {
                            trace!(%peer, "admission queue full");
                            tokio::spawn(reject(stream));
                        } else {
                            queue.push(stream);
                        }
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
    }
}

/// Overflow path: a pre-rendered `503` and a closed socket.
async fn reject(mut stream: TcpStream) {
    let _ = stream.write_all(RAW_503).await;
    let _ = stream.shutdown().await;
}

async fn worker(queue: Arc<SegQueue<TcpStream>>, router: Arc<Router>, wait: WaitStrategy) {
    let mut buf = InlineBuf::<INLINE_CAPACITY>::new();

    loop {
        let stream = loop {
            if let Some(stream) = queue.pop() {
                break stream;
            }
            match wait {
                WaitStrategy::Yield => tokio::task::yield_now().await,
                WaitStrategy::Sleep(delay) => tokio::time::sleep(delay).await,
            }
        };

        serve_connection(stream, &router, &mut buf).await;
    }
}

async fn serve_connection(mut stream: TcpStream, router: &Router, buf: &mut InlineBuf) {
    loop {
        buf.clear();

        // Read until the header terminator is buffered.
        loop {
            let n = match stream.read(buf.unfilled()).await {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    trace!(error = %e, "read failed");
                    return;
                }
            };
            buf.advance(n);
            if memmem::find(buf.as_slice(), b"\r\n\r\n").is_some() {
                break;
            }
            if buf.is_full() {
                debug!("request exceeds buffer capacity");
                return;
            }
        }

        let line = match RequestLine::decode(buf.as_slice()) {
            Ok(line) => line,
            Err(_) => return,
        };
        if !line.version.is_served() {
            return;
        }
        let version = line.version;

        let mut rsp = Response::new();
        rsp.set_version(version);

        match router.dispatch(buf.as_slice(), line, &mut rsp) {
            Dispatch::Done => {
                let close = version == Version::Http10 || rsp.streams();
                let encoded = rsp.encode(Some(&DateStamp::now()));
                if stream.write_all(&encoded.buf).await.is_err() {
                    return;
                }
                if close {
                    return;
                }
            }
            Dispatch::Deferred(complete) => {
                match stream.into_std() {
                    Ok(std_stream) => complete(Completion::new(std_stream, version)),
                    Err(e) => warn!(error = %e, "detach failed"),
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::route::Route;
    use crate::Request;
    use tokio::sync::oneshot;

    fn pong_router() -> Arc<Router> {
        Arc::new(
            Router::builder()
                .route(Route::new("GET", "/ping", |_req: &Request<'_>,
                                                   rsp: &mut Response| {
                    rsp.body(b"pong".to_vec());
                    Dispatch::Done
                }))
                .build()
                .unwrap(),
        )
    }

    async fn spawn_pool(limits: PoolLimits) -> (std::net::SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = TaskPoolServer::new(listener, pong_router(), limits);
        tokio::spawn(server.launch_until(async {
            let _ = rx.await;
        }));

        (addr, tx)
    }

    #[tokio::test]
    async fn workers_serve_from_the_queue() {
        let limits = PoolLimits {
            workers: 2,
            ..PoolLimits::default()
        };
        let (addr, _stop) = spawn_pool(limits).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /ping HTTP/1.0\r\n\r\n").await.unwrap();

        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).await.unwrap();
        let text = String::from_utf8(rsp).unwrap();

        assert!(text.starts_with("HTTP/1.0 200\r\n"));
        assert!(text.contains("\r\ndate: "));
        assert!(text.ends_with("pong"));
    }

    #[tokio::test]
    async fn keep_alive_within_one_worker() {
        let limits = PoolLimits {
            workers: 1,
            ..PoolLimits::default()
        };
        let (addr, _stop) = spawn_pool(limits).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        for _ in 0..2 {
            stream.write_all(b"GET /ping HTTP/1.1\r\n\r\n").await.unwrap();
            let mut got = vec![0u8; 4];
            // Header block is fixed width: status line (14) + date (37)
            // + content-length (19) + blank line (2).
            let mut header = vec![0u8; 72];
            stream.read_exact(&mut header).await.unwrap();
            stream.read_exact(&mut got).await.unwrap();
            assert_eq!(got, b"pong");
        }
    }

    #[tokio::test]
    async fn queue_overflow_gets_a_503() {
        let limits = PoolLimits {
            workers: 1,
            max_pending_connections: 0,
            ..PoolLimits::default()
        };
        let (addr, _stop) = spawn_pool(limits).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut rsp = Vec::new();
        stream.read_to_end(&mut rsp).await.unwrap();

        assert_eq!(rsp, RAW_503);
    }
}
