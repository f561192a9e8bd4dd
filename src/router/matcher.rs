//! Request matching and dispatch.
//!
//! The router is built once, before traffic. Literal routes live in a
//! perfect-hash table keyed on start-line fingerprints; pattern routes
//! are tried sequentially after a table miss. If table construction
//! cannot find a collision-free candidate, the whole literal set falls
//! back to sequential key comparison and the engine keeps working, just
//! slower.

use crate::errors::BuildError;
use crate::http::request_line::{HeaderScan, RequestLine, FINGERPRINT_LEN};
use crate::http::response::Response;
use crate::http::types::{eq_ignore_case, StatusCode, Version};
use crate::limits::RouterLimits;
use crate::router::builder::PerfectHashTable;
use crate::router::route::{parse_pattern, Dispatch, Params, Pattern, Responder, Route};

/// One decoded request, borrowed from the connection's inline buffer.
///
/// Every accessor returns a slice of that buffer; nothing is copied.
/// Headers are scanned lazily on first access.
pub struct Request<'a> {
    buf: &'a [u8],
    line: RequestLine,
    params: Params<'a>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(buf: &'a [u8], line: RequestLine, params: Params<'a>) -> Self {
        Self { buf, line, params }
    }

    #[inline(always)]
    pub fn method(&self) -> &'a [u8] {
        self.line.method(self.buf)
    }

    #[inline(always)]
    pub fn path(&self) -> &'a [u8] {
        self.line.path(self.buf)
    }

    #[inline(always)]
    pub fn query(&self) -> Option<&'a [u8]> {
        self.line.query(self.buf)
    }

    /// The path as `&str`, or `None` if it is not valid UTF-8.
    pub fn path_str(&self) -> Option<&'a str> {
        simdutf8::basic::from_utf8(self.path()).ok()
    }

    /// The query string as `&str`, or `None` if absent or not valid UTF-8.
    pub fn query_str(&self) -> Option<&'a str> {
        simdutf8::basic::from_utf8(self.query()?).ok()
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.line.version
    }

    /// Lazy scan over the header block.
    pub fn headers(&self) -> HeaderScan<'a> {
        self.line.headers(self.buf)
    }

    /// First header with the given name, ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers().find(name.as_bytes())
    }

    /// Bytes after the header terminator, if the block is complete.
    pub fn body(&self) -> Option<&'a [u8]> {
        let mut scan = self.headers();
        while scan.next_header().is_some() {}
        scan.body_start().map(|at| &self.buf[at..])
    }

    /// A capture from a `:param` or `*rest` pattern segment.
    pub fn param(&self, name: &str) -> Option<&'a [u8]> {
        self.params.get(name)
    }

    /// The raw request bytes as received.
    pub fn raw(&self) -> &'a [u8] {
        self.buf
    }
}

struct StaticEntry {
    route: Route,
    key: Vec<u8>,
}

struct DynamicEntry {
    route: Route,
    pattern: Pattern,
}

/// Immutable route set shared by every connection.
pub struct Router {
    statics: Vec<StaticEntry>,
    table: Option<PerfectHashTable>,
    dynamics: Vec<DynamicEntry>,
    any_case_insensitive: bool,
    limits: RouterLimits,
    fallback: Box<dyn Responder>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Whether the literal route set is served by a perfect-hash table
    /// (as opposed to the sequential fallback).
    pub fn uses_hash_table(&self) -> bool {
        self.table.is_some()
    }

    /// Matches `line` and runs the winning responder, or the fallback
    /// when nothing matches.
    pub(crate) fn dispatch(&self, buf: &[u8], line: RequestLine, rsp: &mut Response) -> Dispatch {
        let mut params = Params::default();
        let responder = match self.find(buf, &line, &mut params) {
            Some(route) => route.responder.as_ref(),
            None => self.fallback.as_ref(),
        };

        let req = Request::new(buf, line, params);
        responder.respond(&req, rsp)
    }

    fn find<'s>(
        &'s self,
        buf: &'s [u8],
        line: &RequestLine,
        params: &mut Params<'s>,
    ) -> Option<&'s Route> {
        if let Some(table) = &self.table {
            let verify = self.limits.require_exact_paths;
            let request_key = line.route_key(buf);

            let fp = line.fingerprint(buf);
            if let Some(entry) = table.lookup(&fp, verify).map(|i| &self.statics[i as usize]) {
                if !entry.route.case_insensitive && self.accepts(entry, request_key) {
                    return Some(&entry.route);
                }
            }

            if self.any_case_insensitive {
                let folded = line.fingerprint_folded(buf);
                if let Some(entry) = table.lookup(&folded, verify).map(|i| &self.statics[i as usize])
                {
                    if entry.route.case_insensitive && self.accepts(entry, request_key) {
                        return Some(&entry.route);
                    }
                }
            }
        } else if !self.statics.is_empty() {
            // Sequential fallback compares full keys, so routes that
            // were indistinguishable to the table still resolve here.
            let request_key = line.route_key(buf);
            for entry in &self.statics {
                if key_matches(entry, request_key) {
                    return Some(&entry.route);
                }
            }
        }

        let method = line.method(buf);
        let path = line.path(buf);
        for entry in &self.dynamics {
            let method_hit = if entry.route.case_insensitive {
                eq_ignore_case(&entry.route.method, method)
            } else {
                entry.route.method == method
            };
            if !method_hit {
                continue;
            }
            params.clear();
            if entry
                .pattern
                .matches(path, entry.route.case_insensitive, params)
            {
                return Some(&entry.route);
            }
        }

        params.clear();
        None
    }

    /// Final gate on a table hit. With exact paths required, the full
    /// method+path bytes must agree with the stored key, which closes
    /// the door on engineered fingerprint collisions.
    fn accepts(&self, entry: &StaticEntry, request_key: &[u8]) -> bool {
        !self.limits.require_exact_paths || key_matches(entry, request_key)
    }
}

fn key_matches(entry: &StaticEntry, request_key: &[u8]) -> bool {
    if entry.route.case_insensitive {
        eq_ignore_case(&entry.key, request_key)
    } else {
        entry.key == request_key
    }
}

fn not_found(_req: &Request<'_>, rsp: &mut Response) -> Dispatch {
    rsp.status(StatusCode::NotFound).body(Vec::new());
    Dispatch::Done
}

/// Collects routes and constructs a [`Router`].
///
/// # Examples
///
/// ```
/// use falcon_web::{Dispatch, Route, Router};
///
/// let router = Router::builder()
///     .route(Route::new("GET", "/ping", |_req, rsp| {
///         rsp.body(b"pong".to_vec());
///         Dispatch::Done
///     }))
///     .build()
///     .unwrap();
/// assert!(router.uses_hash_table());
/// ```
pub struct RouterBuilder {
    routes: Vec<Route>,
    limits: RouterLimits,
    fallback: Option<Box<dyn Responder>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            limits: RouterLimits::default(),
            fallback: None,
        }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn limits(mut self, limits: RouterLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Responder for requests no route matches. Defaults to an empty
    /// `404`.
    pub fn fallback(mut self, responder: impl Responder + 'static) -> Self {
        self.fallback = Some(Box::new(responder));
        self
    }

    pub fn build(self) -> Result<Router, BuildError> {
        if self.routes.is_empty() {
            return Err(BuildError::EmptyRouteSet);
        }

        let mut statics: Vec<StaticEntry> = Vec::new();
        let mut dynamics: Vec<DynamicEntry> = Vec::new();

        for route in self.routes {
            match parse_pattern(&route.path)? {
                Some(pattern) => dynamics.push(DynamicEntry { route, pattern }),
                None => {
                    let key = route.key();
                    statics.push(StaticEntry { route, key });
                }
            }
        }

        let mut seen: Vec<&[u8]> = statics.iter().map(|e| e.key.as_slice()).collect();
        seen.sort_unstable();
        if let Some(pair) = seen.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(BuildError::DuplicateRoute(
                String::from_utf8_lossy(pair[0]).into_owned(),
            ));
        }
        for (i, a) in dynamics.iter().enumerate() {
            for b in &dynamics[i + 1..] {
                if a.route.method == b.route.method && a.route.path == b.route.path {
                    return Err(BuildError::DuplicateRoute(
                        String::from_utf8_lossy(&a.route.path).into_owned(),
                    ));
                }
            }
        }

        let table = if statics.is_empty() {
            None
        } else {
            let fps: Vec<[u8; FINGERPRINT_LEN]> = statics
                .iter()
                .map(|entry| {
                    let mut fp = [0u8; FINGERPRINT_LEN];
                    let len = entry.key.len().min(FINGERPRINT_LEN);
                    fp[..len].copy_from_slice(&entry.key[..len]);
                    fp
                })
                .collect();

            match PerfectHashTable::build(&fps, &self.limits) {
                Ok(table) => Some(table),
                Err(BuildError::NoCandidate) => {
                    tracing::warn!(
                        routes = statics.len(),
                        "no perfect hash candidate, falling back to sequential matching"
                    );
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let any_case_insensitive = statics.iter().any(|entry| entry.route.case_insensitive);

        Ok(Router {
            statics,
            table,
            dynamics,
            any_case_insensitive,
            limits: self.limits,
            fallback: self.fallback.unwrap_or_else(|| Box::new(not_found)),
        })
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
