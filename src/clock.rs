//! Monotonic time source and named, cancellable single-shot timers.
//!
//! The instance never reads wall-clock time directly; every deadline and
//! duration comparison goes through a `Clock` so tests can drive the
//! protocol without sleeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

/// A monotonic instant, opaque outside of this module except for
/// addition/comparison, so the instance can't accidentally do wall-clock
/// arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(u64);

impl Deadline {
    pub fn nanos_since_epoch(self) -> u64 {
        self.0
    }

    pub(crate) fn from_nanos(nanos: u64) -> Self {
        Deadline(nanos)
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline(0)
    }
}

/// Injected time source. `SystemClock` wraps `Instant::now()`;
/// `ManualClock` (see `tests`) lets test code advance time explicitly.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Deadline;

    fn after(&self, d: Duration) -> Deadline {
        Deadline(self.now().0.saturating_add(d.as_nanos() as u64))
    }

    fn is_expired(&self, deadline: Deadline) -> bool {
        self.now() >= deadline
    }
}

/// Real monotonic clock, backed by `std::time::Instant`.
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Deadline {
        Deadline(self.origin.elapsed().as_nanos() as u64)
    }
}

/// A deterministic clock for tests: time only advances when told to.
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.nanos
            .fetch_add(d.as_nanos() as u64, AtomicOrdering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Deadline {
        Deadline(self.nanos.load(AtomicOrdering::SeqCst))
    }
}

/// A named, cancellable single-shot timer key. The shell re-schedules
/// `PeriodicPing` every tick; scheduling under the same key cancels the
/// prior instance. Per-probe timeouts aren't modeled here — they're the
/// `timeout` argument `Peer::ask` already takes, not a shell timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    PeriodicPing,
}

/// Bookkeeping for in-flight named timers, generation-counted so that a
/// cancelled-then-rescheduled timer under the same key can't fire twice.
#[derive(Default)]
pub struct TimerRegistry {
    generations: HashMap<TimerKey, u64>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new generation for `key`, invalidating any
    /// previously-scheduled timer under the same key, and returns the
    /// generation the caller must present back to `is_current`.
    pub fn schedule(&mut self, key: TimerKey) -> u64 {
        let gen = self.generations.entry(key).or_insert(0);
        *gen = gen.wrapping_add(1);
        *gen
    }

    pub fn cancel(&mut self, key: TimerKey) {
        self.generations.remove(&key);
    }

    /// Whether a fired timer for `(key, generation)` is still the live one.
    pub fn is_current(&self, key: TimerKey, generation: u64) -> bool {
        self.generations.get(&key) == Some(&generation)
    }
}
