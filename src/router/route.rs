//! Route registration types and dynamic path patterns.
//!
//! A route is a method, a path pattern, and a responder. Purely literal
//! paths go into the perfect-hash table; patterns containing `:param` or
//! `*rest` segments are matched by per-segment comparison after a table
//! miss.

use crate::errors::BuildError;
use crate::http::response::Response;
use crate::router::matcher::Request;
use crate::http::types::eq_ignore_case;
use crate::server::conn::Completion;
use memchr::memchr;

/// How a responder finished.
pub enum Dispatch {
    /// The response is filled in; the engine encodes and writes it.
    Done,
    /// The response will be produced elsewhere. The engine detaches the
    /// connection and hands its [`Completion`] to the closure; writing
    /// the response becomes the closure's job.
    Deferred(Box<dyn FnOnce(Completion) + Send + 'static>),
}

/// Produces a response for one matched request.
///
/// Implemented for any `Fn(&Request, &mut Response) -> Dispatch` closure.
pub trait Responder: Send + Sync {
    fn respond(&self, req: &Request<'_>, rsp: &mut Response) -> Dispatch;
}

impl<F> Responder for F
where
    F: Fn(&Request<'_>, &mut Response) -> Dispatch + Send + Sync,
{
    fn respond(&self, req: &Request<'_>, rsp: &mut Response) -> Dispatch {
        self(req, rsp)
    }
}

/// One registered route.
///
/// # Examples
///
/// ```
/// use falcon_web::{Dispatch, Route, StatusCode};
///
/// let ping = Route::new("GET", "/ping", |_req, rsp| {
///     rsp.status(StatusCode::Ok).body(b"pong".to_vec());
///     Dispatch::Done
/// });
///
/// let user = Route::new("GET", "/users/:id", |req, rsp| {
///     let id = req.param("id").unwrap_or(b"?");
///     rsp.body(id.to_vec());
///     Dispatch::Done
/// }).case_insensitive();
/// ```
pub struct Route {
    pub(crate) method: Vec<u8>,
    pub(crate) path: Vec<u8>,
    pub(crate) case_insensitive: bool,
    pub(crate) responder: Box<dyn Responder + 'static>,
}

impl Route {
    pub fn new<F>(method: &str, path: &str, responder: F) -> Self
    where
        F: Fn(&Request<'_>, &mut Response) -> Dispatch + Send + Sync + 'static,
    {
        Self::with_responder(method, path, responder)
    }

    /// Registers a non-closure [`Responder`] implementation.
    pub fn with_responder(method: &str, path: &str, responder: impl Responder + 'static) -> Self {
        Self {
            method: method.as_bytes().to_vec(),
            path: path.as_bytes().to_vec(),
            case_insensitive: false,
            responder: Box::new(responder),
        }
    }

    /// Matches method and path ASCII case-insensitively.
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// The `method SP path` bytes this route keys on. Folded to
    /// lowercase for case-insensitive routes, mirroring the folded
    /// request fingerprint they are matched against.
    pub(crate) fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.method.len() + 1 + self.path.len());
        key.extend_from_slice(&self.method);
        key.push(b' ');
        key.extend_from_slice(&self.path);
        if self.case_insensitive {
            crate::http::types::to_lower_case(&mut key);
        }
        key
    }
}

// PATTERNS

pub(crate) enum Segment {
    Literal(Vec<u8>),
    Param(Vec<u8>),
    CatchAll(Vec<u8>),
}

pub(crate) struct Pattern {
    pub(crate) segments: Vec<Segment>,
}

/// Parses a registered path. Returns `None` for purely literal paths,
/// which belong in the hash table instead.
pub(crate) fn parse_pattern(path: &[u8]) -> Result<Option<Pattern>, BuildError> {
    let invalid = || BuildError::InvalidPattern(String::from_utf8_lossy(path).into_owned());

    let rest = match path.split_first() {
        Some((b'/', rest)) => rest,
        _ => return Err(invalid()),
    };
    if rest.is_empty() {
        // Bare "/" is a literal route.
        return Ok(None);
    }

    let mut segments = Vec::new();
    let mut dynamic = false;
    let parts: Vec<&[u8]> = rest.split(|b| *b == b'/').collect();

    for (i, part) in parts.iter().enumerate() {
        let last = i + 1 == parts.len();
        match part.split_first() {
            Some((b':', name)) => {
                if name.is_empty() {
                    return Err(invalid());
                }
                dynamic = true;
                segments.push(Segment::Param(name.to_vec()));
            }
            Some((b'*', name)) => {
                if name.is_empty() || !last {
                    return Err(invalid());
                }
                dynamic = true;
                segments.push(Segment::CatchAll(name.to_vec()));
            }
            _ => segments.push(Segment::Literal(part.to_vec())),
        }
    }

    if dynamic {
        Ok(Some(Pattern { segments }))
    } else {
        Ok(None)
    }
}

impl Pattern {
    /// Per-segment comparison against a request path. Captures land in
    /// `params`; the first catch-all short-circuits with the remainder.
    ///
    /// `params` may hold stale captures from an earlier failed candidate;
    /// the caller clears it between candidates.
    pub(crate) fn matches<'a>(
        &'a self,
        path: &'a [u8],
        case_insensitive: bool,
        params: &mut Params<'a>,
    ) -> bool {
        let mut rest = match path.split_first() {
            Some((b'/', rest)) => Some(rest),
            _ => return false,
        };

        for segment in &self.segments {
            if let Segment::CatchAll(name) = segment {
                params.push(name, rest.unwrap_or(b""));
                return true;
            }

            let current = match rest {
                Some(current) => current,
                None => return false,
            };
            let (part, tail) = match memchr(b'/', current) {
                Some(slash) => (&current[..slash], Some(&current[slash + 1..])),
                None => (current, None),
            };

            match segment {
                Segment::Literal(lit) => {
                    let eq = if case_insensitive {
                        eq_ignore_case(lit, part)
                    } else {
                        lit.as_slice() == part
                    };
                    if !eq {
                        return false;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return false;
                    }
                    params.push(name, part);
                }
                Segment::CatchAll(_) => unreachable!(),
            }

            rest = tail;
        }

        rest.is_none()
    }
}

/// Path captures from a dynamic route, borrowed from the request buffer.
#[derive(Default)]
pub struct Params<'a> {
    pairs: Vec<(&'a [u8], &'a [u8])>,
}

impl<'a> Params<'a> {
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == name.as_bytes())
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn push(&mut self, name: &'a [u8], value: &'a [u8]) {
        self.pairs.push((name, value));
    }

    pub(crate) fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod patterns {
    use super::*;

    fn pattern(path: &str) -> Pattern {
        parse_pattern(path.as_bytes()).unwrap().unwrap()
    }

    #[test]
    fn literal_paths_are_not_patterns() {
        assert!(parse_pattern(b"/").unwrap().is_none());
        assert!(parse_pattern(b"/ping").unwrap().is_none());
        assert!(parse_pattern(b"/a/b/c").unwrap().is_none());
    }

    #[test]
    fn invalid_patterns_rejected() {
        let cases: [&[u8]; 4] = [b"", b"no-slash", b"/users/:", b"/files/*all/tail"];

        for path in cases {
            assert!(
                matches!(parse_pattern(path), Err(BuildError::InvalidPattern(_))),
                "case: {:?}",
                path
            );
        }
    }

    #[test]
    fn param_capture() {
        let p = pattern("/users/:id/posts/:post");
        let mut params = Params::default();

        assert!(p.matches(b"/users/42/posts/7", false, &mut params));
        assert_eq!(params.get("id"), Some(&b"42"[..]));
        assert_eq!(params.get("post"), Some(&b"7"[..]));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn param_rejects_empty_segment() {
        let p = pattern("/users/:id");
        let mut params = Params::default();

        assert!(!p.matches(b"/users/", false, &mut params));
        assert!(!p.matches(b"/users", false, &mut params));
        assert!(!p.matches(b"/users/1/extra", false, &mut params));
    }

    #[test]
    fn catch_all_takes_the_remainder() {
        let p = pattern("/static/*file");
        let mut params = Params::default();

        assert!(p.matches(b"/static/css/site.css", false, &mut params));
        assert_eq!(params.get("file"), Some(&b"css/site.css"[..]));

        params.clear();
        assert!(p.matches(b"/static/", false, &mut params));
        assert_eq!(params.get("file"), Some(&b""[..]));
    }

    #[test]
    fn literal_segment_case_modes() {
        let p = pattern("/Api/:v");
        let mut params = Params::default();

        assert!(!p.matches(b"/api/1", false, &mut params));
        params.clear();
        assert!(p.matches(b"/api/1", true, &mut params));
    }

    #[test]
    fn route_key_folds_when_case_insensitive() {
        let route = Route::new("GET", "/PING", |_: &Request, _: &mut Response| Dispatch::Done);
        assert_eq!(route.key(), b"GET /PING");

        let folded = route.case_insensitive();
        assert_eq!(folded.key(), b"get /ping");
    }
}
