//! Per-connection state and the response write path.
//!
//! Writes are optimistic: the encoded response leaves in one syscall in
//! the common case, vectored across preamble, cached date and remainder
//! when a date stamp is present. A short write or `WouldBlock` parks the
//! unsent tail on the connection; the event loop resumes it on the next
//! writable readiness event instead of spinning.

use crate::buf::{FillOutcome, InlineBuf, INLINE_CAPACITY};
use crate::errors::SocketError;
use crate::http::date::DateStamp;
use crate::http::response::{Encoded, Response};
use crate::http::types::Version;
use memchr::memmem;
use std::io::{self, IoSlice, Write};
use std::net::Shutdown;
use std::os::fd::{FromRawFd, IntoRawFd};

/// What a readable readiness event produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadStatus {
    /// The header terminator is buffered; the request can be dispatched.
    Complete,
    /// More bytes are needed; wait for the next readiness event.
    Partial,
    /// Peer closed its write side before a complete request arrived.
    Closed,
    /// The buffer filled without a header terminator.
    Overflow,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WriteProgress {
    Done,
    /// The socket would block; the unsent tail is parked.
    Blocked,
}

/// Unsent response tail, resumed on writable readiness.
pub(crate) struct PendingWrite {
    buf: Vec<u8>,
    at: usize,
}

pub(crate) struct Connection {
    pub(crate) stream: mio::net::TcpStream,
    pub(crate) buf: InlineBuf<INLINE_CAPACITY>,
    pub(crate) pending: Option<PendingWrite>,
    pub(crate) close_after_write: bool,
}

impl Connection {
    pub(crate) fn new(stream: mio::net::TcpStream) -> Self {
        Self {
            stream,
            buf: InlineBuf::new(),
            pending: None,
            close_after_write: false,
        }
    }

    /// Drains the socket into the inline buffer and reports whether a
    /// complete request is now buffered.
    pub(crate) fn read_ready(&mut self) -> Result<ReadStatus, SocketError> {
        let outcome = self.buf.fill_from(&mut self.stream)?;

        if memmem::find(self.buf.as_slice(), b"\r\n\r\n").is_some() {
            return Ok(ReadStatus::Complete);
        }

        Ok(match outcome {
            FillOutcome::Drained => ReadStatus::Partial,
            FillOutcome::Closed => ReadStatus::Closed,
            FillOutcome::Full => ReadStatus::Overflow,
        })
    }

    pub(crate) fn start_write(
        &mut self,
        encoded: &Encoded,
        date: Option<&DateStamp>,
    ) -> Result<WriteProgress, SocketError> {
        match write_encoded(&mut self.stream, encoded, date)? {
            WriteOutcome::Done => Ok(WriteProgress::Done),
            WriteOutcome::Parked(pending) => {
                self.pending = Some(pending);
                Ok(WriteProgress::Blocked)
            }
        }
    }

    pub(crate) fn continue_write(&mut self) -> Result<WriteProgress, SocketError> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(WriteProgress::Done);
        };

        loop {
            match self.stream.write(&pending.buf[pending.at..]) {
                Ok(0) => {
                    return Err(SocketError::WriteFailed(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => {
                    pending.at += n;
                    if pending.at == pending.buf.len() {
                        return Ok(WriteProgress::Done);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending = Some(pending);
                    return Ok(WriteProgress::Blocked);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SocketError::WriteFailed(e)),
            }
        }
    }
}

pub(crate) enum WriteOutcome {
    Done,
    Parked(PendingWrite),
}

/// First write attempt for an encoded response. When the response
/// carries a date gap and the caller supplies a stamp, the stamp's
/// bytes are spliced over the gap with a vectored write, so a response
/// encoded earlier still leaves with the current date and nothing else
/// is re-rendered.
pub(crate) fn write_encoded<W: Write>(
    stream: &mut W,
    encoded: &Encoded,
    date: Option<&DateStamp>,
) -> Result<WriteOutcome, SocketError> {
    let buf = &encoded.buf;

    // The stamp width is fixed, so splicing never changes the total.
    let parts: [&[u8]; 3] = match (&encoded.date_gap, date) {
        (Some(gap), Some(stamp)) => {
            debug_assert_eq!(gap.len(), stamp.as_bytes().len());
            [&buf[..gap.start], stamp.as_bytes(), &buf[gap.end..]]
        }
        _ => [buf, &[], &[]],
    };

    let first = if parts[1].is_empty() {
        stream.write(parts[0])
    } else {
        let slices = [
            IoSlice::new(parts[0]),
            IoSlice::new(parts[1]),
            IoSlice::new(parts[2]),
        ];
        stream.write_vectored(&slices)
    };

    let mut written = match first {
        Ok(0) => return Err(SocketError::WriteFailed(io::ErrorKind::WriteZero.into())),
        Ok(n) => n,
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => 0,
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => 0,
        Err(e) => return Err(SocketError::WriteFailed(e)),
    };

    loop {
        if written == buf.len() {
            return Ok(WriteOutcome::Done);
        }
        match stream.write(chunk_at(&parts, written)) {
            Ok(0) => return Err(SocketError::WriteFailed(io::ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(WriteOutcome::Parked(PendingWrite {
                    buf: tail_from(&parts, written),
                    at: 0,
                }));
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(SocketError::WriteFailed(e)),
        }
    }
}

/// Remainder of the segment `at` falls into, in logical write order.
fn chunk_at<'a>(parts: &[&'a [u8]; 3], mut at: usize) -> &'a [u8] {
    for part in parts {
        if at < part.len() {
            return &part[at..];
        }
        at -= part.len();
    }
    &[]
}

/// Materializes the logical bytes past `at` for parking.
fn tail_from(parts: &[&[u8]; 3], mut at: usize) -> Vec<u8> {
    let mut tail = Vec::new();
    for part in parts {
        if at >= part.len() {
            at -= part.len();
            continue;
        }
        tail.extend_from_slice(&part[at..]);
        at = 0;
    }
    tail
}

/// Move-only handle to one detached connection, handed to deferred
/// responders.
///
/// [`send`](Self::send) consumes the handle, so exactly one response can
/// ever be written through it. Dropping an unsent `Completion` closes
/// the socket, so a completion that is forgotten or panics still cannot
/// leak its connection.
pub struct Completion {
    stream: std::net::TcpStream,
    version: Version,
}

impl Completion {
    pub(crate) fn new(stream: std::net::TcpStream, version: Version) -> Self {
        Self { stream, version }
    }

    pub(crate) fn from_mio(stream: mio::net::TcpStream, version: Version) -> Self {
        // SAFETY: into_raw_fd transfers ownership of the descriptor and
        // it is wrapped exactly once.
        let stream = unsafe { std::net::TcpStream::from_raw_fd(stream.into_raw_fd()) };
        Self::new(stream, version)
    }

    /// Writes the response and closes the connection.
    ///
    /// Runs on the caller's thread in blocking mode; the event loop is
    /// not involved.
    pub fn send(mut self, rsp: &mut Response) -> Result<(), SocketError> {
        rsp.set_version(self.version);
        let encoded = rsp.encode(Some(&DateStamp::now()));

        self.stream
            .set_nonblocking(false)
            .map_err(SocketError::WriteFailed)?;
        self.stream
            .write_all(&encoded.buf)
            .map_err(SocketError::WriteFailed)?;
        self.stream.shutdown(Shutdown::Both).ok();
        Ok(())
    }
}
