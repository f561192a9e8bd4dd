//! Core HTTP protocol types and byte-level utilities.

// TO LOWER CASE

#[rustfmt::skip]
const ASCII_TABLE: [u8; 256] = [
    //   x0    x1    x2    x3    x4    x5    x6    x7    x8    x9    xA    xB    xC    xD    xE    xF
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, // 0x
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, // 1x
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, // 2x
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, // 3x
    0x40, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 4x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, // 5x
    0x60, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 6x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // 7x
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F, // 8x
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F, // 9x
    0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, // Ax
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, // Bx
    0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF, // Cx
    0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF, // Dx
    0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF, // Ex
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF, // Fx
];

/// Branchless ASCII lowercase, one table load per byte.
#[inline(always)]
pub(crate) fn to_lower_case(src: &mut [u8]) {
    for byte in src.iter_mut() {
        *byte = ASCII_TABLE[*byte as usize];
    }
}

#[inline(always)]
pub(crate) fn into_lower_case(src: &[u8], result: &mut [u8]) -> usize {
    let len = src.len().min(result.len());
    for i in 0..len {
        result[i] = ASCII_TABLE[src[i] as usize];
    }
    len
}

#[inline(always)]
pub(crate) fn eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| ASCII_TABLE[*x as usize] == ASCII_TABLE[*y as usize])
}

// DECIMAL

/// Digit count of `n` in base 10. Used by the response size pre-pass.
#[inline(always)]
pub(crate) const fn dec_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Appends `n` rendered in base 10. Appends exactly [`dec_len`]`(n)` bytes.
pub(crate) fn push_dec(n: usize, out: &mut Vec<u8>) {
    let mut digits = [0u8; 20];
    let mut at = digits.len();
    let mut rest = n;

    loop {
        at -= 1;
        digits[at] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }

    out.extend_from_slice(&digits[at..]);
}

// VERSION

const TOKEN_HTTP10: u64 = u64::from_be_bytes(*b"HTTP/1.0");
const TOKEN_HTTP11: u64 = u64::from_be_bytes(*b"HTTP/1.1");
const TOKEN_HTTP20: u64 = u64::from_be_bytes(*b"HTTP/2.0");
const TOKEN_HTTP30: u64 = u64::from_be_bytes(*b"HTTP/3.0");

/// HTTP protocol version, decoded from the fixed 8-byte token at the end
/// of the request line.
///
/// The token is read as one big-endian `u64` and matched against four
/// literals; no per-byte scanning. `HTTP/2.0` and `HTTP/3.0` are
/// recognized so the engine can refuse them deliberately rather than
/// report a parse error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
    Http20,
    Http30,
}

impl Version {
    #[inline(always)]
    pub(crate) const fn from_token(raw: u64) -> Option<Self> {
        match raw {
            TOKEN_HTTP10 => Some(Version::Http10),
            TOKEN_HTTP11 => Some(Version::Http11),
            TOKEN_HTTP20 => Some(Version::Http20),
            TOKEN_HTTP30 => Some(Version::Http30),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_bytes(self) -> &'static [u8; 8] {
        match self {
            Version::Http10 => b"HTTP/1.0",
            Version::Http11 => b"HTTP/1.1",
            Version::Http20 => b"HTTP/2.0",
            Version::Http30 => b"HTTP/3.0",
        }
    }

    /// Versions this engine will answer on the wire.
    #[inline(always)]
    pub const fn is_served(self) -> bool {
        matches!(self, Version::Http10 | Version::Http11)
    }
}

// STATUS CODE

macro_rules! set_status_codes {
    ($($name:ident => $code:literal,)+) => {
        /// HTTP response status codes emitted by the encoder.
        ///
        /// The status line carries only the three-digit code, no reason
        /// phrase: `HTTP/1.1 200\r\n`.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $($name = $code,)+
        }

        impl StatusCode {
            #[inline(always)]
            pub const fn as_u16(self) -> u16 {
                self as u16
            }
        }
    };
}

set_status_codes! {
    Ok => 200,
    Created => 201,
    Accepted => 202,
    NoContent => 204,
    MovedPermanently => 301,
    Found => 302,
    NotModified => 304,
    BadRequest => 400,
    Unauthorized => 401,
    Forbidden => 403,
    NotFound => 404,
    MethodNotAllowed => 405,
    RequestTimeout => 408,
    PayloadTooLarge => 413,
    UriTooLong => 414,
    InternalServerError => 500,
    NotImplemented => 501,
    BadGateway => 502,
    ServiceUnavailable => 503,
    HttpVersionNotSupported => 505,
}

impl StatusCode {
    /// The three ASCII digits of the code.
    #[inline(always)]
    pub(crate) const fn digits(self) -> [u8; 3] {
        let n = self as u16;
        [
            b'0' + (n / 100) as u8,
            b'0' + (n / 10 % 10) as u8,
            b'0' + (n % 10) as u8,
        ]
    }
}

#[cfg(test)]
mod version {
    use super::*;

    #[test]
    fn token_round_trip() {
        let cases = [
            Version::Http10,
            Version::Http11,
            Version::Http20,
            Version::Http30,
        ];

        for version in cases {
            let raw = u64::from_be_bytes(*version.as_bytes());
            assert_eq!(Version::from_token(raw), Some(version));
        }
    }

    #[test]
    fn unknown_token_rejected() {
        assert_eq!(Version::from_token(u64::from_be_bytes(*b"HTTP/1.2")), None);
        assert_eq!(Version::from_token(u64::from_be_bytes(*b"http/1.1")), None);
        assert_eq!(Version::from_token(0), None);
    }

    #[test]
    fn served_versions() {
        assert!(Version::Http10.is_served());
        assert!(Version::Http11.is_served());
        assert!(!Version::Http20.is_served());
        assert!(!Version::Http30.is_served());
    }
}


#[cfg(test)]
mod bytes {
    use super::*;

    #[test]
    fn lower_case_fold() {
        let mut src = *b"GET /Ping HTTP/1.1";
        to_lower_case(&mut src);
        assert_eq!(&src, b"get /ping http/1.1");
    }

    #[test]
    fn fold_copies_and_truncates() {
        let mut out = [0u8; 4];
        let n = into_lower_case(b"ABCDEF", &mut out);
        assert_eq!(n, 4);
        assert_eq!(&out, b"abcd");
    }

    #[test]
    fn dec_helpers_agree() {
        let cases = [0usize, 9, 10, 99, 100, 1023, 65_536, usize::MAX];

        for n in cases {
            let mut out = Vec::new();
            push_dec(n, &mut out);
            assert_eq!(out.len(), dec_len(n));
            assert_eq!(out, n.to_string().into_bytes());
        }
    }

    #[test]
    fn case_insensitive_equality() {
        assert!(eq_ignore_case(b"Content-Type", b"content-type"));
        assert!(!eq_ignore_case(b"content-type", b"content-typo"));
        assert!(!eq_ignore_case(b"a", b"ab"));
    }
}
