//! Test / Add / Delete / List / Head / Flush over the bitmap and extensions.
//!
//! Every entry point resolves ports through [`RangeIndex`] first, so an
//! out-of-domain request fails with `SetError::Range` before any bit is
//! touched.
//!
//! # Activity rule
//! An id is *active* iff its bit is set and, for timeout layouts, its
//! deadline has not passed. Reads apply this rule lazily; only the reaper
//! (or a re-Add / Delete on the id) physically clears lapsed bits.
//!
//! # Batches
//! Ranged Add/Delete walk ids ascending and apply each id independently.
//! With `exists_ok`, `AlreadyExists`/`NotFound` are swallowed and the walk
//! continues; any other error stops it, leaving the already-applied prefix
//! in place.

use serde::{Deserialize, Serialize};

use super::config::ReAddCounters;
use super::error::SetError;
use super::extension::{
    deadline_after, lapsed, Counters, ExtLayout, DEADLINE_CLAIMED, DEADLINE_UNSET,
};
use super::range::PortId;
use super::PortMap;

/// Extension values carried by one Add request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddExt {
    /// Per-entry timeout in seconds; overrides the set default.
    pub timeout: Option<u32>,
    /// Initial (or overriding) packet count.
    pub packets: Option<u64>,
    /// Initial (or overriding) byte count.
    pub bytes: Option<u64>,
}

impl AddExt {
    pub fn with_timeout(timeout: u32) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn with_counters(packets: u64, bytes: u64) -> Self {
        Self {
            packets: Some(packets),
            bytes: Some(bytes),
            ..Self::default()
        }
    }
}

/// One active entry as reported by List.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub port: u16,
    /// Seconds left before expiry (rounded up; 0 = permanent). Present only
    /// for timeout layouts.
    pub timeout: Option<u32>,
    pub counters: Option<Counters>,
}

/// Set parameters reported without enumerating entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHeader {
    pub first_port: u16,
    pub last_port: u16,
    pub timeout: Option<u32>,
    pub with_counters: bool,
    /// Bytes held by the membership and extension regions.
    pub memsize: usize,
}

impl PortMap {
    /// Reject extension values the layout cannot hold.
    pub(crate) fn check_ext(&self, ext: &AddExt) -> Result<(), SetError> {
        let layout = self.ext.layout();
        if ext.timeout.is_some() && !layout.has_timeout() {
            return Err(SetError::TimeoutNotSupported);
        }
        if (ext.packets.is_some() || ext.bytes.is_some()) && !layout.has_counters() {
            return Err(SetError::CountersNotSupported);
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn is_active(&self, id: PortId, now_ms: u64) -> bool {
        self.members.is_set(id as usize) && !self.ext.expired(id, now_ms)
    }

    /// Membership test; never mutates, never evicts.
    pub(crate) fn test(&self, port: u16) -> Result<bool, SetError> {
        let id = self.range.to_id(port)?;
        Ok(self.is_active(id, self.clock.now_ms()))
    }

    /// Bit state of `port` without applying expiry.
    pub(crate) fn raw_test(&self, port: u16) -> Result<bool, SetError> {
        let id = self.range.to_id(port)?;
        Ok(self.members.is_set(id as usize))
    }

    /// Add or refresh a single id.
    ///
    /// A bit that is set but whose deadline has lapsed counts as absent: the
    /// entry is restarted (fresh counters) rather than reported as existing.
    pub(crate) fn add_id(
        &self,
        id: PortId,
        ext: &AddExt,
        now_ms: u64,
        exists_ok: bool,
    ) -> Result<(), SetError> {
        let layout = self.ext.layout();
        if layout.has_timeout() {
            let timeout = ext.timeout.or(self.config.timeout).unwrap_or(0);
            return self.add_timed(id, ext, now_ms, timeout, exists_ok);
        }
        let fresh = self.members.test_and_set(id as usize);
        if !fresh && !exists_ok {
            return Err(SetError::AlreadyExists {
                port: self.range.from_id(id),
            });
        }
        if layout.has_counters() {
            self.apply_add_counters(id, ext, fresh);
        }
        Ok(())
    }

    /// Add on a timeout layout.
    ///
    /// A live entry is refreshed in place by compare-exchange. A lapsed or
    /// empty one is restarted under the slot claim: the bit is set and the
    /// counters seeded before the new deadline is published, so the entry
    /// becomes visible fully initialized and no sweep can clear it after
    /// this returns.
    fn add_timed(
        &self,
        id: PortId,
        ext: &AddExt,
        now_ms: u64,
        timeout: u32,
        exists_ok: bool,
    ) -> Result<(), SetError> {
        loop {
            let seen = self.ext.deadline(id).unwrap_or(DEADLINE_UNSET);
            if seen == DEADLINE_CLAIMED {
                self.ext.wait_unclaimed(id);
                continue;
            }
            if !lapsed(seen, now_ms) {
                if !exists_ok {
                    return Err(SetError::AlreadyExists {
                        port: self.range.from_id(id),
                    });
                }
                if !self.ext.refresh(id, Some(seen), now_ms, timeout) {
                    continue;
                }
                if self.ext.layout().has_counters() {
                    self.apply_add_counters(id, ext, false);
                }
                return Ok(());
            }
            if self.ext.claim(id, false, |d| d == seen).is_none() {
                continue;
            }
            self.members.test_and_set(id as usize);
            if self.ext.layout().has_counters() {
                self.apply_add_counters(id, ext, true);
            }
            self.ext.release(id, deadline_after(now_ms, timeout));
            return Ok(());
        }
    }

    fn apply_add_counters(&self, id: PortId, ext: &AddExt, fresh: bool) {
        let packets = ext.packets.unwrap_or(0);
        let bytes = ext.bytes.unwrap_or(0);
        if fresh {
            self.ext.set_counters(id, Some(packets), Some(bytes));
            return;
        }
        match self.policy.readd_counters {
            ReAddCounters::Preserve => self.ext.set_counters(id, ext.packets, ext.bytes),
            ReAddCounters::Reset => self.ext.set_counters(id, Some(packets), Some(bytes)),
            ReAddCounters::Accumulate => self.ext.accumulate(id, packets, bytes),
        }
    }

    /// Add the inclusive span `[port, port_to]` (reversed endpoints swap).
    pub(crate) fn add(
        &self,
        port: u16,
        port_to: Option<u16>,
        ext: &AddExt,
        exists_ok: bool,
    ) -> Result<(), SetError> {
        self.check_ext(ext)?;
        let span = self.range.id_span(port, port_to.unwrap_or(port))?;
        let now_ms = self.clock.now_ms();
        for id in span {
            if let Err(err) = self.add_id(id, ext, now_ms, exists_ok) {
                if !(exists_ok && err.is_exists()) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Remove a single id.
    ///
    /// A lapsed entry is cleared but still reported as `NotFound`.
    pub(crate) fn del_id(&self, id: PortId, now_ms: u64) -> Result<(), SetError> {
        let (was_set, seen) = self.clear_id(id);
        if !was_set || seen.is_some_and(|deadline| lapsed(deadline, now_ms)) {
            return Err(SetError::NotFound {
                port: self.range.from_id(id),
            });
        }
        Ok(())
    }

    /// Clear `id`'s bit and empty its slot.
    ///
    /// Returns whether the bit was set and, for timeout layouts, the
    /// deadline it carried. Counters are zeroed before the bit clears so a
    /// concurrent fresh Add never inherits them.
    pub(crate) fn clear_id(&self, id: PortId) -> (bool, Option<u64>) {
        let seen = self.ext.claim(id, true, |_| true);
        self.ext.set_counters(id, Some(0), Some(0));
        let was_set = self.members.test_and_clear(id as usize);
        if seen.is_some() {
            self.ext.release(id, DEADLINE_UNSET);
        }
        (was_set, seen)
    }

    /// Delete the inclusive span `[port, port_to]` (reversed endpoints swap).
    pub(crate) fn del(
        &self,
        port: u16,
        port_to: Option<u16>,
        exists_ok: bool,
    ) -> Result<(), SetError> {
        let span = self.range.id_span(port, port_to.unwrap_or(port))?;
        let now_ms = self.clock.now_ms();
        for id in span {
            if let Err(err) = self.del_id(id, now_ms) {
                if !(exists_ok && err.is_exists()) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Active entries in ascending port order.
    ///
    /// Every call takes a fresh snapshot; there is no cursor to invalidate.
    pub(crate) fn list(&self) -> Vec<Entry> {
        let now_ms = self.clock.now_ms();
        self.members
            .ones()
            .filter_map(|idx| {
                let id = idx as PortId;
                if self.ext.expired(id, now_ms) {
                    return None;
                }
                let snap = self.ext.read(id);
                Some(Entry {
                    port: self.range.from_id(id),
                    timeout: snap.remaining_secs(now_ms),
                    counters: snap.counters,
                })
            })
            .collect()
    }

    pub(crate) fn head(&self) -> SetHeader {
        SetHeader {
            first_port: self.range.first(),
            last_port: self.range.last(),
            timeout: self.config.timeout,
            with_counters: self.config.with_counters,
            memsize: self.memsize(),
        }
    }

    /// Drop every entry; the set stays usable.
    ///
    /// Entries are cleared one id at a time, each under its slot claim. An
    /// Add racing with Flush either lands before its id is visited and is
    /// removed, or after and survives intact.
    pub(crate) fn flush(&self) {
        if self.ext.layout() == ExtLayout::None {
            self.members.clear();
            return;
        }
        for idx in self.members.ones() {
            self.clear_id(idx as PortId);
        }
    }
}

#[cfg(test)]
#[path = "adt_tests.rs"]
mod adt_tests;
