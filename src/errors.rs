//! Error taxonomy of the dispatch engine.
//!
//! Transient, per-connection failures never escalate past closing that one
//! connection. Construction-time failures ([`BuildError`]) are surfaced
//! synchronously to the caller assembling the router, before any traffic
//! is accepted.

use std::io;
use thiserror::Error;

/// Request bytes could not be decoded into a request line.
///
/// The connection is closed without a response; generating a well-formed
/// error body for an unparsable request line is not attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Request-line grammar violation: missing method/path space, missing
    /// version token, or an unrecognized 8-byte version literal.
    #[error("malformed request line")]
    MalformedRequest,

    /// The version token parsed but names a protocol this engine does not
    /// serve (`HTTP/2.0`, `HTTP/3.0`).
    #[error("unsupported protocol version")]
    UnsupportedVersion,
}

/// Socket-level failure. Closes the affected connection; never fatal to
/// the event loop.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    #[error("read into request buffer failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("response write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("connection close failed: {0}")]
    CloseFailed(#[source] io::Error),
}

/// Route-table construction failure, reported before the server starts.
///
/// `NoCandidate` is recoverable: the router falls back to sequential key
/// matching for that route set. The other variants are configuration
/// mistakes and abort the build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("route set is empty")]
    EmptyRouteSet,

    #[error("duplicate route key: {0}")]
    DuplicateRoute(String),

    #[error("no collision-free (seed, shift, mask) triple within the search budget")]
    NoCandidate,

    #[error("invalid route pattern: {0}")]
    InvalidPattern(String),
}
