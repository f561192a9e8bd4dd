//! Engine configuration limits and tuning knobs.
//!
//! Defaults are conservative: a small fixed request buffer, a bounded
//! connection slab, and exact-path route verification. Relax them only
//! when you control both ends of the wire.
//!
//! # Examples
//!
//! ```no_run
//! use falcon_web::limits::{EngineLimits, RouterLimits};
//! use std::time::Duration;
//!
//! let limits = EngineLimits {
//!     max_connections: 4096,
//!     reuse_port: true,
//!     ..EngineLimits::default()
//! };
//! let router_limits = RouterLimits {
//!     minimal_table: true,
//!     ..RouterLimits::default()
//! };
//! ```

use std::time::Duration;

/// Readiness event-loop and socket configuration.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Listen backlog passed to the kernel (default: `1024`).
    pub backlog: u32,

    /// Set `SO_REUSEPORT` on the listener (default: `false`).
    ///
    /// Enables running one event loop per core against the same address,
    /// letting the kernel spread accepted connections across them.
    pub reuse_port: bool,

    /// Set `TCP_NODELAY` on accepted sockets (default: `true`).
    pub nodelay: bool,

    /// Poll timeout per loop iteration (default: `1 second`).
    ///
    /// Bounds how stale the cached `date` header value can get and how
    /// long shutdown can be delayed when no traffic arrives. `None` blocks
    /// indefinitely; the wakeup token still interrupts it.
    pub poll_timeout: Option<Duration>,

    /// Capacity of the preallocated connection slab (default: `1024`).
    ///
    /// Each slot carries a fixed request buffer; connections accepted
    /// while the slab is full are dropped.
    pub max_connections: usize,

    /// Emit a cached `date` header on every response (default: `true`).
    pub send_date: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            backlog: 1024,
            reuse_port: false,
            nodelay: true,
            poll_timeout: Some(Duration::from_secs(1)),
            max_connections: 1024,
            send_date: true,

            _priv: (),
        }
    }
}

/// Route-table construction configuration.
#[derive(Debug, Clone)]
pub struct RouterLimits {
    /// Maximum number of byte positions extracted per route key,
    /// `1..=8` (default: `8`).
    pub max_key_width: usize,

    /// Search for a minimal table, sized exactly to the route count,
    /// instead of the next power of two (default: `false`).
    ///
    /// Saves memory for large route sets at the cost of a longer
    /// construction search and a modulo per lookup.
    pub minimal_table: bool,

    /// Compare the full method+path bytes against the stored route on
    /// every table hit (default: `true`).
    ///
    /// Disabling trades certainty for one fewer comparison: an input
    /// engineered to agree on all extracted key bytes would dispatch to
    /// the colliding route.
    pub require_exact_paths: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RouterLimits {
    fn default() -> Self {
        Self {
            max_key_width: 8,
            minimal_table: false,
            require_exact_paths: true,

            _priv: (),
        }
    }
}

/// Worker-pool configuration for the queue-based runtime.
///
/// Exactly `workers` long-lived tasks are spawned at startup; each polls
/// the shared admission queue using `wait_strategy`. No per-connection
/// task is ever created.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Number of worker tasks processing connections (default: `100`).
    pub workers: usize,

    /// Capacity of the admission queue between accept and the workers
    /// (default: `250`).
    ///
    /// When full, new connections receive an immediate `503` and are
    /// closed.
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue to refill
    /// (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            workers: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are queued.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin on [`tokio::task::yield_now()`]. Lowest latency, near-full
    /// CPU occupancy while idle.
    Yield,

    /// Park on [`tokio::time::sleep()`] between queue polls.
    Sleep(Duration),
}
