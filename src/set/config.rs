//! Set configuration, creation options, and configuration equality.
//!
//! # Invariants
//! - `SetConfig` is normalized on construction: `first_port <= last_port`
//!   and `timeout <= MAX_TIMEOUT_SECS`.
//! - The extension layout is a pure function of the configuration.
//!
//! # Design Notes
//! - Serializable configuration is kept apart from runtime-only knobs
//!   (`CreateOptions`): a clock or a reaper override never takes part in
//!   equality checks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::extension::{gc_period, ExtLayout, MAX_TIMEOUT_SECS};
use super::range::{normalize, RangeIndex};
use crate::stdx::clock::{Clock, MonotonicClock};

/// Immutable configuration of one bitmap:port set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetConfig {
    pub first_port: u16,
    pub last_port: u16,
    /// Default entry timeout in seconds; `Some(0)` keeps the timeout layout
    /// but makes entries permanent unless an Add overrides it.
    pub timeout: Option<u32>,
    pub with_counters: bool,
}

impl SetConfig {
    /// Normalize the range and clamp the timeout.
    pub fn new(first_port: u16, last_port: u16, timeout: Option<u32>, with_counters: bool) -> Self {
        let (first_port, last_port) = normalize(first_port, last_port);
        Self {
            first_port,
            last_port,
            timeout: timeout.map(clamp_timeout),
            with_counters,
        }
    }

    #[inline]
    pub fn range(&self) -> RangeIndex {
        RangeIndex::new(self.first_port, self.last_port)
    }

    #[inline]
    pub fn elements(&self) -> usize {
        self.range().elements()
    }

    #[inline]
    pub fn layout(&self) -> ExtLayout {
        ExtLayout::select(self.with_counters, self.timeout.is_some())
    }
}

/// Clamp a user timeout to the supported maximum.
#[inline]
pub fn clamp_timeout(secs: u32) -> u32 {
    secs.min(MAX_TIMEOUT_SECS)
}

/// True iff two sets were configured identically and may be swapped.
///
/// Membership contents are not compared.
pub fn same_config(a: &SetConfig, b: &SetConfig) -> bool {
    a.first_port == b.first_port
        && a.last_port == b.last_port
        && a.timeout == b.timeout
        && a.with_counters == b.with_counters
}

/// What a tolerated re-Add does to an entry's running counters.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReAddCounters {
    /// Keep running totals; explicitly supplied values overwrite them.
    #[default]
    Preserve = 0,
    /// Zero the totals, then apply supplied values.
    Reset = 1,
    /// Add supplied values to the running totals.
    Accumulate = 2,
}

/// Behavioural policy chosen at creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPolicy {
    pub readd_counters: ReAddCounters,
}

/// Runtime-only creation knobs.
#[derive(Clone)]
pub struct CreateOptions {
    /// Time source for deadlines; defaults to [`MonotonicClock`].
    pub clock: Arc<dyn Clock>,
    /// Reaper period override; defaults to [`gc_period`] of the set timeout.
    pub reaper_interval: Option<Duration>,
    pub policy: SetPolicy,
}

impl CreateOptions {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = Some(interval);
        self
    }

    pub fn with_policy(mut self, policy: SetPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Effective reaper period for `config`.
    pub(crate) fn interval_for(&self, config: &SetConfig) -> Duration {
        self.reaper_interval
            .filter(|interval| !interval.is_zero())
            .unwrap_or_else(|| gc_period(config.timeout.unwrap_or(0)))
    }
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(MonotonicClock::new()),
            reaper_interval: None,
            policy: SetPolicy::default(),
        }
    }
}

impl fmt::Debug for CreateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOptions")
            .field("clock", &self.clock)
            .field("reaper_interval", &self.reaper_interval)
            .field("policy", &self.policy)
            .finish()
    }
}
