//! Per-entry extensions: layout selection and the side table that holds them.
//!
//! A set picks one [`ExtLayout`] at creation. The layout fixes how many
//! `AtomicU64` words each id owns in the [`ExtensionStore`] and where the
//! deadline and counter words sit inside that stride. Offsets are resolved
//! once, so the hot path never branches on the variant beyond an
//! `Option` check.
//!
//! ```text
//!   layout             stride   word 0      word 1     word 2
//!   None               0        -           -          -
//!   TimeoutOnly        1        deadline    -          -
//!   CounterOnly        2        packets     bytes      -
//!   TimeoutAndCounter  3        deadline    packets    bytes
//! ```
//!
//! # Deadline encoding
//! - `DEADLINE_UNSET` (0): slot reset; the entry is treated as inactive.
//! - `DEADLINE_PERMANENT` (`u64::MAX`): entry never expires.
//! - `DEADLINE_CLAIMED` (`u64::MAX - 1`): a writer owns the slot; inactive.
//! - anything else: absolute expiry time in clock milliseconds.
//!
//! # Slot claims
//! For timeout layouts the deadline word doubles as a per-id claim. Every
//! path that restarts or empties an entry (fresh Add, Delete, Flush, sweep)
//! first swaps the deadline it observed for `DEADLINE_CLAIMED`, touches the
//! bit and counters, then releases by publishing the final deadline. A
//! live refresh only ever compare-exchanges from the value it read, so it
//! can never overwrite a claim.
//!
//! Outside a claim, a clear bit always carries `DEADLINE_UNSET` and a set
//! bit never does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SetError;
use super::range::PortId;

/// Largest accepted timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u32 = u32::MAX / 1_000 / 2;

/// Upper bound on the reaper period, in seconds.
pub const GC_TIME_SECS: u32 = 3 * 60;

pub(crate) const DEADLINE_UNSET: u64 = 0;
pub(crate) const DEADLINE_PERMANENT: u64 = u64::MAX;
pub(crate) const DEADLINE_CLAIMED: u64 = u64::MAX - 1;

/// Reaper period for a set whose default timeout is `timeout_secs`.
///
/// A third of the timeout, at least one second and at most
/// [`GC_TIME_SECS`].
pub fn gc_period(timeout_secs: u32) -> Duration {
    Duration::from_secs(u64::from((timeout_secs / 3).clamp(1, GC_TIME_SECS)))
}

/// Absolute deadline for an entry added at `now_ms` with `timeout_secs`.
///
/// A zero timeout yields a permanent entry.
#[inline]
pub(crate) fn deadline_after(now_ms: u64, timeout_secs: u32) -> u64 {
    if timeout_secs == 0 {
        return DEADLINE_PERMANENT;
    }
    // Saturate below the sentinels so a huge clock value stays expirable.
    now_ms
        .saturating_add(u64::from(timeout_secs) * 1_000)
        .min(DEADLINE_CLAIMED - 1)
}

/// Whether a deadline word reading `deadline` marks an inactive entry.
#[inline]
pub(crate) const fn lapsed(deadline: u64, now_ms: u64) -> bool {
    match deadline {
        DEADLINE_PERMANENT => false,
        DEADLINE_UNSET | DEADLINE_CLAIMED => true,
        d => d <= now_ms,
    }
}

/// Fixed per-entry payload shape, chosen once at set creation.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtLayout {
    None = 0,
    TimeoutOnly = 1,
    CounterOnly = 2,
    TimeoutAndCounter = 3,
}

impl ExtLayout {
    /// Pick the layout for the requested capabilities.
    pub const fn select(with_counters: bool, with_timeout: bool) -> Self {
        match (with_counters, with_timeout) {
            (true, true) => Self::TimeoutAndCounter,
            (true, false) => Self::CounterOnly,
            (false, true) => Self::TimeoutOnly,
            (false, false) => Self::None,
        }
    }

    #[inline]
    pub const fn has_timeout(self) -> bool {
        matches!(self, Self::TimeoutOnly | Self::TimeoutAndCounter)
    }

    #[inline]
    pub const fn has_counters(self) -> bool {
        matches!(self, Self::CounterOnly | Self::TimeoutAndCounter)
    }

    /// Words per id.
    #[inline]
    pub const fn stride(self) -> usize {
        match self {
            Self::None => 0,
            Self::TimeoutOnly => 1,
            Self::CounterOnly => 2,
            Self::TimeoutAndCounter => 3,
        }
    }

    const fn timeout_offset(self) -> Option<usize> {
        if self.has_timeout() {
            Some(0)
        } else {
            None
        }
    }

    const fn counter_offset(self) -> Option<usize> {
        match self {
            Self::CounterOnly => Some(0),
            Self::TimeoutAndCounter => Some(1),
            _ => None,
        }
    }
}

/// Running packet/byte totals of one entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

/// Point-in-time copy of one entry's extension slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtSnapshot {
    /// Raw deadline word, present only for timeout layouts.
    pub deadline_ms: Option<u64>,
    pub counters: Option<Counters>,
}

impl ExtSnapshot {
    /// Whole seconds left before expiry, rounded up; `Some(0)` for a
    /// permanent entry, `None` without a timeout layout.
    pub fn remaining_secs(&self, now_ms: u64) -> Option<u32> {
        self.deadline_ms.map(|deadline| {
            if deadline == DEADLINE_PERMANENT {
                return 0;
            }
            let left_ms = deadline.saturating_sub(now_ms);
            u32::try_from(left_ms.div_ceil(1_000)).unwrap_or(u32::MAX)
        })
    }
}

/// Side table of extension words indexed by id.
///
/// Every field is an independent atomic; there is no cross-field
/// consistency (a snapshot may pair a fresh deadline with stale counters
/// under concurrent writers).
#[derive(Debug)]
pub struct ExtensionStore {
    layout: ExtLayout,
    words: Box<[AtomicU64]>,
    timeout_off: Option<usize>,
    counter_off: Option<usize>,
}

impl ExtensionStore {
    /// Allocate zeroed slots for `elements` ids.
    ///
    /// The `None` layout allocates nothing.
    pub fn allocate(layout: ExtLayout, elements: usize) -> Result<Self, SetError> {
        let len = layout.stride() * elements;
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| SetError::OutOfMemory {
                bytes: len * std::mem::size_of::<AtomicU64>(),
            })?;
        words.extend((0..len).map(|_| AtomicU64::new(0)));
        Ok(Self {
            layout,
            words: words.into_boxed_slice(),
            timeout_off: layout.timeout_offset(),
            counter_off: layout.counter_offset(),
        })
    }

    #[inline]
    pub fn layout(&self) -> ExtLayout {
        self.layout
    }

    /// Bytes held by the slot table.
    #[inline]
    pub fn memsize(&self) -> usize {
        self.words.len() * std::mem::size_of::<AtomicU64>()
    }

    #[inline(always)]
    fn word(&self, id: PortId, off: usize) -> &AtomicU64 {
        &self.words[id as usize * self.layout.stride() + off]
    }

    /// Copy out the slot for `id`.
    pub fn read(&self, id: PortId) -> ExtSnapshot {
        ExtSnapshot {
            deadline_ms: self.deadline(id),
            counters: self.counter_off.map(|off| Counters {
                packets: self.word(id, off).load(Ordering::Relaxed),
                bytes: self.word(id, off + 1).load(Ordering::Relaxed),
            }),
        }
    }

    /// Raw deadline word; `None` without a timeout layout.
    #[inline]
    pub fn deadline(&self, id: PortId) -> Option<u64> {
        self.timeout_off
            .map(|off| self.word(id, off).load(Ordering::Acquire))
    }

    #[inline]
    fn deadline_word(&self, id: PortId) -> Option<&AtomicU64> {
        self.timeout_off.map(|off| self.word(id, off))
    }

    /// Whether `id` has passed its deadline, or its slot is reset or claimed.
    ///
    /// Always `false` without a timeout layout.
    #[inline]
    pub fn expired(&self, id: PortId, now_ms: u64) -> bool {
        self.deadline(id).is_some_and(|deadline| lapsed(deadline, now_ms))
    }

    /// Push a live deadline out to `now_ms + timeout_secs`.
    ///
    /// Returns `false` (and changes nothing) if the entry is not live, or
    /// if the word moved away from `seen` in the meantime. Pass the value
    /// just read as `seen`; `None` re-reads the word and retries on races.
    pub(crate) fn refresh(
        &self,
        id: PortId,
        seen: Option<u64>,
        now_ms: u64,
        timeout_secs: u32,
    ) -> bool {
        let Some(word) = self.deadline_word(id) else {
            return false;
        };
        let next = deadline_after(now_ms, timeout_secs);
        let mut current = seen.unwrap_or_else(|| word.load(Ordering::Acquire));
        loop {
            if lapsed(current, now_ms) {
                return false;
            }
            match word.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(_) if seen.is_some() => return false,
                Err(actual) => current = actual,
            }
        }
    }

    /// Take ownership of `id`'s slot if its deadline satisfies `claimable`.
    ///
    /// Returns the deadline the claim replaced, or `None` when the
    /// predicate rejects it. A slot claimed by another path is waited out
    /// if `wait` is set and skipped otherwise. Always `None` without a
    /// timeout layout.
    pub(crate) fn claim(
        &self,
        id: PortId,
        wait: bool,
        claimable: impl Fn(u64) -> bool,
    ) -> Option<u64> {
        let word = self.deadline_word(id)?;
        loop {
            let seen = word.load(Ordering::Acquire);
            if seen == DEADLINE_CLAIMED {
                if !wait {
                    return None;
                }
                std::hint::spin_loop();
                continue;
            }
            if !claimable(seen) {
                return None;
            }
            if word
                .compare_exchange_weak(seen, DEADLINE_CLAIMED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(seen);
            }
        }
    }

    /// End a claim by publishing `deadline` (`DEADLINE_UNSET` empties it).
    #[inline]
    pub(crate) fn release(&self, id: PortId, deadline: u64) {
        if let Some(word) = self.deadline_word(id) {
            debug_assert_eq!(word.load(Ordering::Relaxed), DEADLINE_CLAIMED);
            word.store(deadline, Ordering::Release);
        }
    }

    /// Spin until no path holds a claim on `id`.
    #[inline]
    pub(crate) fn wait_unclaimed(&self, id: PortId) {
        if let Some(word) = self.deadline_word(id) {
            while word.load(Ordering::Acquire) == DEADLINE_CLAIMED {
                std::hint::spin_loop();
            }
        }
    }

    /// Add a hit to the running totals. No-op without a counter layout.
    #[inline]
    pub fn accumulate(&self, id: PortId, packets: u64, bytes: u64) {
        if let Some(off) = self.counter_off {
            self.word(id, off).fetch_add(packets, Ordering::Relaxed);
            self.word(id, off + 1).fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Overwrite the counters of `id`; `None` leaves a field untouched.
    #[inline]
    pub fn set_counters(&self, id: PortId, packets: Option<u64>, bytes: Option<u64>) {
        if let Some(off) = self.counter_off {
            if let Some(packets) = packets {
                self.word(id, off).store(packets, Ordering::Relaxed);
            }
            if let Some(bytes) = bytes {
                self.word(id, off + 1).store(bytes, Ordering::Relaxed);
            }
        }
    }
}
