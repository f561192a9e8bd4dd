//! falcon_web - allocation-frugal HTTP/1.x dispatch engine
//!
//! A request-dispatch core built around three ideas: decode without
//! copying, route without comparing strings, respond without growing
//! buffers.
//!
//! # Pipeline
//!
//! - **Inline request buffer** - each connection reads into a fixed
//!   1 KiB array; decoding records offsets into it, never copies
//! - **Single-pass request line** - one forward scan yields method,
//!   path, query and version; the 8-byte version token is matched as a
//!   single integer
//! - **Perfect-hash routing** - literal routes resolve with one
//!   multiply, shift and mask over at most eight fingerprint bytes,
//!   verified against the stored key; `:param` and `*rest` patterns are
//!   matched per segment after a table miss
//! - **Exact-size responses** - a sizing pass computes the wire length,
//!   one allocation holds it, one (vectored) syscall sends it
//!
//! # Runtimes
//!
//! Two interchangeable front ends drive the same router:
//! [`EventLoop`], a single-threaded edge-triggered readiness loop meant
//! to be replicated per core over `SO_REUSEPORT`, and
//! [`TaskPoolServer`], a bounded tokio worker pool fed by a lock-free
//! admission queue.
//!
//! # Examples
//!
//! ```no_run
//! use falcon_web::{Dispatch, EngineLimits, EventLoop, Route, Router, StatusCode};
//! use std::sync::Arc;
//!
//! fn main() -> std::io::Result<()> {
//!     let router = Arc::new(
//!         Router::builder()
//!             .route(Route::new("GET", "/ping", |_req, rsp| {
//!                 rsp.status(StatusCode::Ok).body(b"pong".to_vec());
//!                 Dispatch::Done
//!             }))
//!             .route(Route::new("GET", "/users/:id", |req, rsp| {
//!                 rsp.body(req.param("id").unwrap_or(b"?").to_vec());
//!                 Dispatch::Done
//!             }))
//!             .build()
//!             .expect("route table"),
//!     );
//!
//!     let mut engine = EventLoop::bind(
//!         "127.0.0.1:8080".parse().unwrap(),
//!         router,
//!         EngineLimits::default(),
//!     )?;
//!     let shutdown = engine.shutdown_handle();
//!     ctrlc_like(move || shutdown.shutdown().unwrap());
//!     engine.run()
//! }
//! # fn ctrlc_like(_f: impl FnOnce() + Send + 'static) {}
//! ```
//!
//! Responses that cannot be produced inline hand their connection to a
//! deferred completion:
//!
//! ```no_run
//! use falcon_web::{Completion, Dispatch, Response, Route, StatusCode};
//!
//! let route = Route::new("POST", "/jobs", |_req, _rsp| {
//!     Dispatch::Deferred(Box::new(|completion: Completion| {
//!         std::thread::spawn(move || {
//!             let mut rsp = Response::new();
//!             rsp.status(StatusCode::Accepted).body(b"queued".to_vec());
//!             completion.send(&mut rsp).ok();
//!         });
//!     }))
//! });
//! ```

pub(crate) mod buf;
pub(crate) mod errors;
pub mod limits;
pub(crate) mod http {
    pub(crate) mod date;
    pub(crate) mod request_line;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod router {
    pub(crate) mod builder;
    pub(crate) mod matcher;
    pub(crate) mod route;
}
pub(crate) mod server {
    pub(crate) mod conn;
    pub(crate) mod event_loop;
    pub(crate) mod slab;
    pub(crate) mod task_pool;
}

pub use crate::{
    buf::{InlineBuf, INLINE_CAPACITY},
    errors::{BuildError, DecodeError, SocketError},
    http::{
        request_line::{HeaderScan, RequestLine, FINGERPRINT_LEN},
        response::Response,
        types::{StatusCode, Version},
    },
    limits::{EngineLimits, PoolLimits, RouterLimits, WaitStrategy},
    router::{
        matcher::{Request, Router, RouterBuilder},
        route::{Dispatch, Params, Responder, Route},
    },
    server::{
        conn::Completion,
        event_loop::{EventLoop, LoopState, ShutdownHandle},
        task_pool::TaskPoolServer,
    },
};
