//! Zero-copy request-line decoding over the inline buffer.
//!
//! Decoding is a single forward pass that records offsets into the
//! caller's buffer; no bytes are copied and nothing is allocated. The
//! only copy in the hot path is the fixed 64-byte start-line fingerprint
//! handed to the route table.
//!
//! Header lines are not touched during decoding. [`HeaderScan`] walks
//! them lazily, yielding borrowed name/value slices, and records where
//! the body starts when it crosses the blank line.

use crate::errors::DecodeError;
use crate::http::types::{self, Version};
use memchr::{memchr, memchr2_iter};

/// Width of the start-line fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 64;

/// Number of bytes that must follow the path: one space plus the 8-byte
/// version token.
const VERSION_TAIL: usize = 9;

/// Offsets of one decoded request line. All indices point into the
/// buffer the line was decoded from; the struct owns nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Index of the space terminating the method.
    pub method_end: usize,
    /// Index of the first `?` inside the target, if any.
    pub query_start: Option<usize>,
    /// Index of the space terminating the path.
    pub path_end: usize,
    /// Decoded protocol version.
    pub version: Version,
    /// Index of the `\r` closing the line. Always `path_end + 9`.
    pub end: usize,
}

impl RequestLine {
    /// Decodes the request line at the start of `buf`.
    ///
    /// Fails with [`DecodeError::MalformedRequest`] on any grammar
    /// violation, including an unrecognized version token. The caller
    /// decides separately whether a recognized version is served.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let method_end = memchr(b' ', buf).ok_or(DecodeError::MalformedRequest)?;
        if method_end == 0 {
            return Err(DecodeError::MalformedRequest);
        }

        // One scan past the method: remember the first '?', stop at the
        // next space.
        let mut query_start = None;
        let mut path_end = None;
        for idx in memchr2_iter(b' ', b'?', &buf[method_end + 1..]) {
            let at = method_end + 1 + idx;
            if buf[at] == b'?' {
                if query_start.is_none() {
                    query_start = Some(at);
                }
            } else {
                path_end = Some(at);
                break;
            }
        }
        let path_end = path_end.ok_or(DecodeError::MalformedRequest)?;
        if path_end == method_end + 1 {
            return Err(DecodeError::MalformedRequest);
        }
        if let Some(q) = query_start {
            if q == method_end + 1 {
                return Err(DecodeError::MalformedRequest);
            }
        }

        let end = path_end + VERSION_TAIL;
        if buf.len() < end + 2 || &buf[end..end + 2] != b"\r\n" {
            return Err(DecodeError::MalformedRequest);
        }

        let mut token = [0u8; 8];
        token.copy_from_slice(&buf[path_end + 1..end]);
        let version = Version::from_token(u64::from_be_bytes(token))
            .ok_or(DecodeError::MalformedRequest)?;

        Ok(Self {
            method_end,
            query_start,
            path_end,
            version,
            end,
        })
    }

    #[inline(always)]
    pub fn method<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[..self.method_end]
    }

    /// Path without the query string.
    #[inline(always)]
    pub fn path<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.method_end + 1..self.query_start.unwrap_or(self.path_end)]
    }

    /// Query string after the `?`, if present.
    #[inline(always)]
    pub fn query<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        self.query_start.map(|q| &buf[q + 1..self.path_end])
    }

    /// The `method SP path` bytes the route table keys on. The query
    /// string and version token are excluded, so `/a?x=1` and `/a` key
    /// identically, as do HTTP/1.0 and HTTP/1.1 requests.
    #[inline(always)]
    pub(crate) fn route_key<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[..self.query_start.unwrap_or(self.path_end)]
    }

    /// Fixed-width copy of the route-key bytes, zero padded.
    #[inline(always)]
    pub(crate) fn fingerprint(&self, buf: &[u8]) -> [u8; FINGERPRINT_LEN] {
        let mut fp = [0u8; FINGERPRINT_LEN];
        let key = self.route_key(buf);
        let len = key.len().min(FINGERPRINT_LEN);
        fp[..len].copy_from_slice(&key[..len]);
        fp
    }

    /// Fingerprint with every byte folded to ASCII lowercase.
    #[inline(always)]
    pub(crate) fn fingerprint_folded(&self, buf: &[u8]) -> [u8; FINGERPRINT_LEN] {
        let mut fp = [0u8; FINGERPRINT_LEN];
        types::into_lower_case(self.route_key(buf), &mut fp);
        fp
    }

    /// Lazy scan over the header block following this line.
    #[inline(always)]
    pub fn headers<'a>(&self, buf: &'a [u8]) -> HeaderScan<'a> {
        HeaderScan::new(buf, self.end + 2)
    }
}

/// Lazy header iterator. Yields borrowed `(name, value)` slices and
/// records the body offset when it crosses the terminating blank line.
///
/// Nothing is validated or copied up front; a handler that never looks
/// at headers pays nothing for them.
pub struct HeaderScan<'a> {
    buf: &'a [u8],
    cursor: usize,
    body_start: Option<usize>,
    done: bool,
}

impl<'a> HeaderScan<'a> {
    pub(crate) fn new(buf: &'a [u8], headers_start: usize) -> Self {
        Self {
            buf,
            cursor: headers_start.min(buf.len()),
            body_start: None,
            done: false,
        }
    }

    /// Offset of the first body byte. `Some` only after the scan has
    /// crossed the `\r\n\r\n` terminator.
    #[inline(always)]
    pub fn body_start(&self) -> Option<usize> {
        self.body_start
    }

    pub fn next_header(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        if self.done {
            return None;
        }

        let rest = &self.buf[self.cursor..];
        if rest.starts_with(b"\r\n") {
            self.body_start = Some(self.cursor + 2);
            self.done = true;
            return None;
        }

        // Stop on an incomplete or malformed line; body_start stays None.
        let nl = match memchr(b'\n', rest) {
            Some(nl) if nl > 0 && rest[nl - 1] == b'\r' => nl,
            _ => {
                self.done = true;
                return None;
            }
        };
        let line = &rest[..nl - 1];
        self.cursor += nl + 1;

        let colon = match memchr(b':', line) {
            Some(colon) => colon,
            None => {
                self.done = true;
                return None;
            }
        };
        let name = &line[..colon];
        let mut value = &line[colon + 1..];
        while let Some((b' ', tail)) = value.split_first() {
            value = tail;
        }

        Some((name, value))
    }

    /// Scans forward until a header named `name` (ASCII case-insensitive)
    /// is found.
    pub fn find(&mut self, name: &[u8]) -> Option<&'a [u8]> {
        while let Some((key, value)) = self.next_header() {
            if types::eq_ignore_case(key, name) {
                return Some(value);
            }
        }
        None
    }
}

impl<'a> Iterator for HeaderScan<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_header()
    }
}

#[cfg(test)]
mod decode {
    use super::*;

    #[test]
    fn minimal_request() {
        let buf = b"GET /ping HTTP/1.1\r\n\r\n";
        let line = RequestLine::decode(buf).unwrap();

        assert_eq!(line.method(buf), b"GET");
        assert_eq!(line.path(buf), b"/ping");
        assert_eq!(line.query(buf), None);
        assert_eq!(line.version, Version::Http11);
        assert_eq!(line.method_end, 3);
        assert_eq!(line.path_end, 9);
        assert_eq!(line.end, 18);
    }

    #[test]
    fn path_end_pins_the_version_tail() {
        let cases: [&[u8]; 3] = [
            b"GET / HTTP/1.1\r\n\r\n",
            b"DELETE /a/b/c?x=1&y=2 HTTP/1.0\r\n\r\n",
            b"OPTIONS * HTTP/1.1\r\n\r\n",
        ];

        for buf in cases {
            let line = RequestLine::decode(buf).unwrap();
            assert_eq!(line.path_end, line.end - 9, "case: {:?}", buf);
        }
    }

    #[test]
    fn query_string_split() {
        let buf = b"GET /search?q=rust&page=2 HTTP/1.1\r\n\r\n";
        let line = RequestLine::decode(buf).unwrap();

        assert_eq!(line.path(buf), b"/search");
        assert_eq!(line.query(buf), Some(&b"q=rust&page=2"[..]));
        assert_eq!(line.route_key(buf), b"GET /search");
    }

    #[test]
    fn only_first_question_mark_counts() {
        let buf = b"GET /a?b=1?c=2 HTTP/1.1\r\n\r\n";
        let line = RequestLine::decode(buf).unwrap();

        assert_eq!(line.path(buf), b"/a");
        assert_eq!(line.query(buf), Some(&b"b=1?c=2"[..]));
    }

    #[test]
    fn versions_decode_without_byte_scanning() {
        let cases: [(&[u8], Version); 4] = [
            (b"GET / HTTP/1.0\r\n\r\n", Version::Http10),
            (b"GET / HTTP/1.1\r\n\r\n", Version::Http11),
            (b"GET / HTTP/2.0\r\n\r\n", Version::Http20),
            (b"GET / HTTP/3.0\r\n\r\n", Version::Http30),
        ];

        for (buf, expected) in cases {
            assert_eq!(RequestLine::decode(buf).unwrap().version, expected);
        }
    }

    #[test]
    fn malformed_lines_rejected() {
        let cases: [&[u8]; 10] = [
            b"",
            b"GET",
            b"GET /nospace",
            b"GET /pingHTTP/1.1\r\n\r\n",
            b" /leading HTTP/1.1\r\n\r\n",
            b"GET  HTTP/1.1\r\n\r\n",
            b"GET /x HTTP/1.5\r\n\r\n",
            b"GET /x http/1.1\r\n\r\n",
            b"GET /x HTTP/1.1",
            b"GET /x HTTP/1.1\n\n",
        ];

        for buf in cases {
            assert_eq!(
                RequestLine::decode(buf),
                Err(DecodeError::MalformedRequest),
                "case: {:?}",
                buf
            );
        }
    }

    #[test]
    fn fingerprint_is_zero_padded_and_query_free() {
        let buf = b"GET /ping?verbose=1 HTTP/1.1\r\n\r\n";
        let line = RequestLine::decode(buf).unwrap();
        let fp = line.fingerprint(buf);

        assert_eq!(&fp[..9], b"GET /ping");
        assert!(fp[9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn folded_fingerprint_lowercases() {
        let buf = b"GET /PING HTTP/1.1\r\n\r\n";
        let line = RequestLine::decode(buf).unwrap();

        assert_eq!(&line.fingerprint_folded(buf)[..9], b"get /ping");
    }

    #[test]
    fn long_start_line_truncates_at_fingerprint_width() {
        let path = "/".repeat(100);
        let raw = format!("GET {path} HTTP/1.1\r\n\r\n");
        let buf = raw.as_bytes();
        let line = RequestLine::decode(buf).unwrap();
        let fp = line.fingerprint(buf);

        assert_eq!(&fp[..], &buf[..FINGERPRINT_LEN]);
    }
}
