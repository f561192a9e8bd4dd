//! Fixed-capacity inline request buffer.
//!
//! One [`InlineBuf`] lives inside each connection slot. It is a plain
//! `[u8; N]` plus an end offset; no allocation, no growth. The end offset
//! moves only when the read path appends bytes, so every decoded slice
//! stays valid for the lifetime of the borrow.

use crate::errors::SocketError;
use std::io::{self, Read};

/// Default request buffer capacity in bytes.
pub const INLINE_CAPACITY: usize = 1024;

/// What a drain pass over a non-blocking socket produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FillOutcome {
    /// At least the socket is drained; `end()` reflects everything read.
    Drained,
    /// The peer closed its write side. Nothing more will arrive.
    Closed,
    /// The buffer is full and the socket may still hold bytes.
    Full,
}

#[derive(Clone)]
pub struct InlineBuf<const N: usize = INLINE_CAPACITY> {
    bytes: [u8; N],
    end: usize,
}

impl<const N: usize> InlineBuf<N> {
    pub const fn new() -> Self {
        Self { bytes: [0u8; N], end: 0 }
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.end]
    }

    #[inline(always)]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline(always)]
    pub const fn is_full(&self) -> bool {
        self.end == N
    }

    /// Resets the end offset. The byte array is left as-is; stale bytes
    /// past the new end are unreachable through `as_slice`.
    #[inline(always)]
    pub fn clear(&mut self) {
        self.end = 0;
    }

    /// The unfilled tail, handed to async read paths that cannot take an
    /// `io::Read`. Must be paired with [`advance`](Self::advance).
    #[inline(always)]
    pub(crate) fn unfilled(&mut self) -> &mut [u8] {
        &mut self.bytes[self.end..]
    }

    /// Marks `n` bytes of the unfilled tail as read.
    #[inline(always)]
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.end + n <= N);
        self.end += n;
    }

    /// Drains a non-blocking reader into the buffer until it would block,
    /// the peer closes, or the buffer fills.
    ///
    /// `WouldBlock` is not an error here: under edge-triggered readiness
    /// the socket must be read to exhaustion each event, and exhaustion
    /// is the normal stopping point.
    pub(crate) fn fill_from<R: Read>(&mut self, reader: &mut R) -> Result<FillOutcome, SocketError> {
        loop {
            if self.end == N {
                return Ok(FillOutcome::Full);
            }

            match reader.read(&mut self.bytes[self.end..]) {
                Ok(0) => return Ok(FillOutcome::Closed),
                Ok(n) => self.end += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FillOutcome::Drained)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SocketError::ReadFailed(e)),
            }
        }
    }
}

impl<const N: usize> Default for InlineBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// `io::Read` stub replaying a scripted sequence of results.
    struct Script(Vec<ScriptStep>);

    enum ScriptStep {
        Data(&'static [u8]),
        WouldBlock,
        Eof,
        Fail,
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.remove(0) {
                ScriptStep::Data(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                ScriptStep::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
                ScriptStep::Eof => Ok(0),
                ScriptStep::Fail => Err(io::ErrorKind::ConnectionReset.into()),
            }
        }
    }

    #[test]
    fn drains_until_would_block() {
        let mut buf = InlineBuf::<64>::new();
        let mut reader = Script(vec![
            ScriptStep::Data(b"GET /pi"),
            ScriptStep::Data(b"ng HTTP/1.1\r\n\r\n"),
            ScriptStep::WouldBlock,
        ]);

        let outcome = buf.fill_from(&mut reader).unwrap();

        assert_eq!(outcome, FillOutcome::Drained);
        assert_eq!(buf.as_slice(), b"GET /ping HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn peer_close_reported_not_errored() {
        let mut buf = InlineBuf::<64>::new();
        let mut reader = Script(vec![ScriptStep::Data(b"GET"), ScriptStep::Eof]);

        assert_eq!(buf.fill_from(&mut reader).unwrap(), FillOutcome::Closed);
        assert_eq!(buf.as_slice(), b"GET");
    }

    #[test]
    fn full_buffer_stops_reading() {
        let mut buf = InlineBuf::<4>::new();
        let mut reader = Script(vec![ScriptStep::Data(b"ABCDEFGH")]);

        assert_eq!(buf.fill_from(&mut reader).unwrap(), FillOutcome::Full);
        assert_eq!(buf.as_slice(), b"ABCD");
        assert!(buf.is_full());
    }

    #[test]
    fn hard_errno_is_an_error() {
        let mut buf = InlineBuf::<64>::new();
        let mut reader = Script(vec![ScriptStep::Fail]);

        assert!(matches!(
            buf.fill_from(&mut reader),
            Err(SocketError::ReadFailed(_))
        ));
    }

    #[test]
    fn clear_resets_only_the_offset() {
        let mut buf = InlineBuf::<64>::new();
        let mut reader = Script(vec![ScriptStep::Data(b"data"), ScriptStep::WouldBlock]);
        buf.fill_from(&mut reader).unwrap();

        buf.clear();

        assert_eq!(buf.end(), 0);
        assert!(buf.as_slice().is_empty());
    }
}
