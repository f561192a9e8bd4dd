//! Response assembly and single-pass encoding.
//!
//! A [`Response`] is a plain description: status, headers, cookies, an
//! optional typed body. Encoding runs in two passes over that
//! description: a sizing pass that computes the exact wire length, one
//! allocation of that many bytes, then a fill pass. The buffer is never
//! grown, shrunk, or copied afterwards, so the whole response can leave
//! in one write syscall.
//!
//! The status line carries no reason phrase: `HTTP/1.1 200\r\n`.

use crate::http::date::DateStamp;
use crate::http::types::{dec_len, push_dec, StatusCode, Version};

// Fixed framing widths used by the sizing pass.
const STATUS_LINE_LEN: usize = 8 + 1 + 3 + 2;
const HEADER_SEP_LEN: usize = 2; // ": "
const CRLF_LEN: usize = 2;
const DATE_PREFIX: &[u8] = b"date: ";
const SET_COOKIE_PREFIX: &[u8] = b"set-cookie: ";
const CONTENT_TYPE_PREFIX: &[u8] = b"content-type: ";
const CHARSET_PREFIX: &[u8] = b"; charset=";
const CONTENT_LENGTH_PREFIX: &[u8] = b"content-length: ";

/// Served when the admission queue overflows. Pre-rendered; no sizing
/// pass at runtime.
pub(crate) const RAW_503: &[u8] =
    b"HTTP/1.1 503\r\nconnection: close\r\ncontent-length: 0\r\n\r\n";

enum Body {
    None,
    /// Fully known body; `content-length` is emitted.
    Sized(Vec<u8>),
    /// First chunk of an unbounded body; `content-length` is omitted and
    /// the connection closes to delimit it.
    Streaming(Vec<u8>),
}

/// One outgoing response, filled by a responder and encoded by the
/// engine.
///
/// # Examples
///
/// ```
/// use falcon_web::{Response, StatusCode};
///
/// let mut rsp = Response::new();
/// rsp.status(StatusCode::Ok)
///     .content_type(b"text/plain")
///     .body(b"Hello, Rust!".to_vec());
/// ```
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    cookies: Vec<Vec<u8>>,
    content_type: Option<(Vec<u8>, Option<Vec<u8>>)>,
    body: Body,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::Ok,
            version: Version::Http11,
            headers: Vec::new(),
            cookies: Vec::new(),
            content_type: None,
            body: Body::None,
        }
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Adds one header line. The name is written as given; lowercase
    /// names keep responses byte-stable across the engine's own headers.
    pub fn header(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.headers
            .push((name.as_ref().to_vec(), value.as_ref().to_vec()));
        self
    }

    /// Adds one `set-cookie` line from a complete cookie descriptor,
    /// e.g. `session=abc123; HttpOnly; Path=/`.
    pub fn cookie(&mut self, descriptor: impl AsRef<[u8]>) -> &mut Self {
        self.cookies.push(descriptor.as_ref().to_vec());
        self
    }

    pub fn content_type(&mut self, media: impl AsRef<[u8]>) -> &mut Self {
        self.content_type = Some((media.as_ref().to_vec(), None));
        self
    }

    /// Appends `; charset=<cs>` to the content type. No effect until
    /// [`content_type`](Self::content_type) has been set.
    pub fn charset(&mut self, cs: impl AsRef<[u8]>) -> &mut Self {
        if let Some((_, charset)) = &mut self.content_type {
            *charset = Some(cs.as_ref().to_vec());
        }
        self
    }

    /// Sets a fully sized body. `content-length` is emitted.
    pub fn body(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.body = Body::Sized(bytes);
        self
    }

    /// Sets the first chunk of a streaming body. `content-length` is
    /// omitted; the peer reads until the connection closes.
    pub fn stream_body(&mut self, first_chunk: Vec<u8>) -> &mut Self {
        self.body = Body::Streaming(first_chunk);
        self
    }

    pub(crate) fn streams(&self) -> bool {
        matches!(self.body, Body::Streaming(_))
    }

    /// Exact number of bytes [`encode`](Self::encode) will produce.
    pub(crate) fn encoded_len(&self, date: Option<&DateStamp>) -> usize {
        let mut size = STATUS_LINE_LEN;

        if let Some(date) = date {
            size += DATE_PREFIX.len() + date.as_bytes().len() + CRLF_LEN;
        }
        for (name, value) in &self.headers {
            size += name.len() + HEADER_SEP_LEN + value.len() + CRLF_LEN;
        }
        for cookie in &self.cookies {
            size += SET_COOKIE_PREFIX.len() + cookie.len() + CRLF_LEN;
        }
        if let Some((media, charset)) = &self.content_type {
            size += CONTENT_TYPE_PREFIX.len() + media.len() + CRLF_LEN;
            if let Some(cs) = charset {
                size += CHARSET_PREFIX.len() + cs.len();
            }
        }
        match &self.body {
            Body::None => size + CRLF_LEN,
            Body::Sized(bytes) => {
                size
                    + CONTENT_LENGTH_PREFIX.len()
                    + dec_len(bytes.len())
                    + CRLF_LEN
                    + CRLF_LEN
                    + bytes.len()
            }
            Body::Streaming(chunk) => size + CRLF_LEN + chunk.len(),
        }
    }

    /// Renders the response into one exactly-sized buffer.
    pub(crate) fn encode(&self, date: Option<&DateStamp>) -> Encoded {
        let size = self.encoded_len(date);
        let mut buf = Vec::with_capacity(size);

        buf.extend_from_slice(self.version.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(&self.status.digits());
        buf.extend_from_slice(b"\r\n");

        let mut date_gap = None;
        if let Some(date) = date {
            buf.extend_from_slice(DATE_PREFIX);
            let start = buf.len();
            buf.extend_from_slice(date.as_bytes());
            date_gap = Some(start..buf.len());
            buf.extend_from_slice(b"\r\n");
        }

        for (name, value) in &self.headers {
            buf.extend_from_slice(name);
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value);
            buf.extend_from_slice(b"\r\n");
        }
        for cookie in &self.cookies {
            buf.extend_from_slice(SET_COOKIE_PREFIX);
            buf.extend_from_slice(cookie);
            buf.extend_from_slice(b"\r\n");
        }
        if let Some((media, charset)) = &self.content_type {
            buf.extend_from_slice(CONTENT_TYPE_PREFIX);
            buf.extend_from_slice(media);
            if let Some(cs) = charset {
                buf.extend_from_slice(CHARSET_PREFIX);
                buf.extend_from_slice(cs);
            }
            buf.extend_from_slice(b"\r\n");
        }
        match &self.body {
            Body::None => buf.extend_from_slice(b"\r\n"),
            Body::Sized(bytes) => {
                buf.extend_from_slice(CONTENT_LENGTH_PREFIX);
                push_dec(bytes.len(), &mut buf);
                buf.extend_from_slice(b"\r\n\r\n");
                buf.extend_from_slice(bytes);
            }
            Body::Streaming(chunk) => {
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(chunk);
            }
        }

        debug_assert_eq!(buf.len(), size);

        Encoded { buf, date_gap }
    }

    /// Returns the response to its post-`new` state so the allocation
    /// backing `headers` can be reused across requests.
    pub fn reset(&mut self) {
        self.status = StatusCode::Ok;
        self.version = Version::Http11;
        self.headers.clear();
        self.cookies.clear();
        self.content_type = None;
        self.body = Body::None;
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// One encoded response. `date_gap` marks the byte range holding the
/// cached date value, so a writer with a fresher stamp can splice it in
/// with a vectored write instead of re-encoding.
pub(crate) struct Encoded {
    pub(crate) buf: Vec<u8>,
    pub(crate) date_gap: Option<std::ops::Range<usize>>,
}
