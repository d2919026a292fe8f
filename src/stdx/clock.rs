//! Millisecond clocks for entry deadlines.
//!
//! Deadlines are absolute milliseconds on a monotonic timeline owned by the
//! clock. [`MonotonicClock`] follows wall time via `Instant`;
//! [`ManualClock`] only moves when told to, which keeps expiry tests
//! deterministic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of "now" for deadline arithmetic.
///
/// Implementations must be monotone non-decreasing.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the clock's origin.
    fn now_ms(&self) -> u64;
}

/// Wall-time monotonic clock anchored at construction.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        // Offset by one so that a fresh clock never reports 0, which deadline
        // slots reserve for "unset".
        u64::try_from(self.origin.elapsed().as_millis())
            .unwrap_or(u64::MAX - 1)
            .saturating_add(1)
    }
}

/// Clock advanced explicitly by the caller.
///
/// Shared through `Arc` so a test can hold one handle while the set (and
/// its reaper thread) hold another.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock at `start_ms`.
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(start_ms),
        })
    }

    /// Advance by a delta, saturating on overflow.
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(ms))
            });
    }

    /// Advance to an absolute time.
    pub fn advance_to(&self, t_ms: u64) {
        let prev = self.now.fetch_max(t_ms, Ordering::AcqRel);
        debug_assert!(t_ms >= prev, "ManualClock must not move backwards");
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
