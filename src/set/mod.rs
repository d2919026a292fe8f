//! The bitmap:port set type.
//!
//! A set covers one contiguous port range `[first_port, last_port]`. Each
//! port maps to a dense id; membership is one bit per id, and optional
//! per-entry extensions (deadline, packet/byte counters) live in a side
//! table whose layout is fixed at creation.
//!
//! ## Components
//! - [`range`]: port ⇄ id mapping.
//! - [`extension`]: layout selection and the extension side table.
//! - [`config`]: immutable configuration, creation knobs, equality.
//! - `adt`: Test / Add / Delete / List / Head / Flush.
//! - `reaper`: periodic eviction of expired entries.
//!
//! ## Concurrency
//! All operations take `&self`. Bit flips and counter updates are single
//! atomic instructions; there is no whole-set lock. Restarting or removing
//! a timed entry happens under a per-id claim held in its deadline word
//! (see [`extension`]). Each id's transition is independently atomic, and
//! a ranged operation is not atomic as a whole.
//!
//! ## Lifecycle
//! `create` allocates both regions and, for timeout layouts, arms the
//! reaper. Dropping the set stops the reaper synchronously; the regions
//! are released after the last sweep has returned.

pub mod config;
pub mod error;
pub mod extension;
pub mod range;

mod adt;
mod reaper;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

pub use adt::{AddExt, Entry, SetHeader};
pub use config::{same_config, CreateOptions, ReAddCounters, SetConfig, SetPolicy};
pub use error::SetError;
pub use extension::{Counters, ExtLayout, ExtSnapshot};
pub use range::{PortId, RangeIndex};
pub use reaper::ReaperState;

use crate::stdx::atomic_bitset::AtomicBitSet;
use crate::stdx::clock::Clock;
use extension::ExtensionStore;
use reaper::Reaper;

/// Shared storage of one set: configuration plus both regions.
///
/// Held by the owning [`BitmapPortSet`] and by its reaper thread.
#[derive(Debug)]
pub(crate) struct PortMap {
    pub(crate) config: SetConfig,
    pub(crate) range: RangeIndex,
    pub(crate) members: AtomicBitSet,
    pub(crate) ext: ExtensionStore,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: SetPolicy,
    /// Serializes sweeps (background and on-demand).
    pub(crate) sweep_lock: Mutex<()>,
}

impl PortMap {
    fn allocate(config: SetConfig, options: &CreateOptions) -> Result<Self, SetError> {
        let range = config.range();
        let elements = range.elements();
        let members = AtomicBitSet::try_empty(elements).map_err(|_| SetError::OutOfMemory {
            bytes: elements.div_ceil(8),
        })?;
        // On failure `members` is dropped here; nothing partial escapes.
        let ext = ExtensionStore::allocate(config.layout(), elements)?;
        Ok(Self {
            config,
            range,
            members,
            ext,
            clock: Arc::clone(&options.clock),
            policy: options.policy,
            sweep_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub(crate) fn memsize(&self) -> usize {
        self.members.memsize() + self.ext.memsize()
    }
}

/// A fixed-range port set.
///
/// # Examples
///
/// ```
/// use portset_rs::set::{AddExt, BitmapPortSet, CreateOptions, SetConfig};
///
/// let set = BitmapPortSet::create(SetConfig::new(1024, 80, None, false), CreateOptions::default())
///     .unwrap();
/// assert_eq!(set.head().first_port, 80);
///
/// set.add(53, &AddExt::default(), false).unwrap_err(); // outside 80..=1024
/// set.add(443, &AddExt::default(), false).unwrap();
/// assert!(set.test(443).unwrap());
/// assert!(!set.test(444).unwrap());
/// ```
#[derive(Debug)]
pub struct BitmapPortSet {
    map: Arc<PortMap>,
    reaper: Option<Reaper>,
}

impl BitmapPortSet {
    /// Allocate a set and, for timeout layouts, arm its reaper.
    ///
    /// Fails with `OutOfMemory` if either region cannot be allocated and
    /// with `ReaperSpawn` if the sweep thread cannot start; in both cases
    /// everything allocated so far is released.
    pub fn create(config: SetConfig, options: CreateOptions) -> Result<Self, SetError> {
        let config = SetConfig::new(
            config.first_port,
            config.last_port,
            config.timeout,
            config.with_counters,
        );
        let map = Arc::new(PortMap::allocate(config, &options)?);
        let reaper = if config.layout().has_timeout() {
            let interval = options.interval_for(&config);
            Some(Reaper::spawn(Arc::clone(&map), interval).map_err(SetError::ReaperSpawn)?)
        } else {
            None
        };
        debug!(
            first_port = config.first_port,
            last_port = config.last_port,
            layout = ?config.layout(),
            memsize = map.memsize(),
            "bitmap:port set created"
        );
        Ok(Self { map, reaper })
    }

    #[inline]
    pub fn config(&self) -> &SetConfig {
        &self.map.config
    }

    #[inline]
    pub fn layout(&self) -> ExtLayout {
        self.map.ext.layout()
    }

    #[inline]
    pub fn range(&self) -> RangeIndex {
        self.map.range
    }

    /// Whether `port` is an active member.
    ///
    /// Expired entries read as absent even before the reaper clears them.
    pub fn test(&self, port: u16) -> Result<bool, SetError> {
        self.map.test(port)
    }

    /// Add (or, with `exists_ok`, refresh) a single port.
    pub fn add(&self, port: u16, ext: &AddExt, exists_ok: bool) -> Result<(), SetError> {
        self.map.add(port, None, ext, exists_ok)
    }

    /// Add every port in `[port, port_to]`; reversed endpoints are swapped.
    ///
    /// Not atomic: on error, ports before the failing one stay added.
    pub fn add_range(
        &self,
        port: u16,
        port_to: u16,
        ext: &AddExt,
        exists_ok: bool,
    ) -> Result<(), SetError> {
        self.map.add(port, Some(port_to), ext, exists_ok)
    }

    /// Remove a single port; `NotFound` if it was not an active member.
    pub fn del(&self, port: u16) -> Result<(), SetError> {
        self.map.del(port, None, false)
    }

    /// Remove every port in `[port, port_to]`.
    pub fn del_range(&self, port: u16, port_to: u16, exists_ok: bool) -> Result<(), SetError> {
        self.map.del(port, Some(port_to), exists_ok)
    }

    /// Active entries in ascending port order.
    pub fn list(&self) -> Vec<Entry> {
        self.map.list()
    }

    /// Configured domain and set parameters.
    pub fn head(&self) -> SetHeader {
        self.map.head()
    }

    /// Remove every entry.
    pub fn flush(&self) {
        self.map.flush();
        debug!(
            first_port = self.map.range.first(),
            last_port = self.map.range.last(),
            "bitmap:port set flushed"
        );
    }

    /// Run one sweep now; returns the number of evicted entries.
    pub fn gc(&self) -> usize {
        self.map.sweep(self.map.clock.now_ms())
    }

    /// Whether `self` and `other` were configured identically.
    pub fn same_set(&self, other: &Self) -> bool {
        same_config(self.config(), other.config())
    }

    pub fn reaper_state(&self) -> ReaperState {
        if self.reaper.is_some() {
            ReaperState::Armed
        } else {
            ReaperState::Idle
        }
    }

    /// Sweep period, if the reaper is armed.
    pub fn reaper_interval(&self) -> Option<Duration> {
        self.reaper.as_ref().map(Reaper::interval)
    }

    /// Physical bit state of `port`, ignoring expiry.
    pub fn raw_contains(&self, port: u16) -> Result<bool, SetError> {
        self.map.raw_test(port)
    }

    /// Number of physically set bits, expired-but-unreaped entries included.
    pub fn raw_len(&self) -> usize {
        self.map.members.count()
    }

    /// Extension slot of `port`, regardless of membership.
    pub fn snapshot(&self, port: u16) -> Result<ExtSnapshot, SetError> {
        let id = self.map.range.to_id(port)?;
        Ok(self.map.ext.read(id))
    }

    #[inline]
    pub(crate) fn map(&self) -> &PortMap {
        &self.map
    }
}

impl Drop for BitmapPortSet {
    fn drop(&mut self) {
        if let Some(mut reaper) = self.reaper.take() {
            reaper.shutdown();
        }
        debug!(
            first_port = self.map.range.first(),
            last_port = self.map.range.last(),
            "bitmap:port set destroyed"
        );
    }
}
