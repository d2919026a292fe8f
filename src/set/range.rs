//! Port ⇄ dense id mapping over a contiguous, inclusive port range.

use std::ops::RangeInclusive;

use super::error::SetError;

/// Dense index of a port inside the set's range.
///
/// Fits `u16`: the widest range (`0..=65535`) has ids `0..=65535`.
pub type PortId = u16;

/// Inclusive `[first, last]` port domain with `first <= last`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeIndex {
    first: u16,
    last: u16,
}

impl RangeIndex {
    /// Build a domain, swapping the endpoints if given reversed.
    #[inline]
    pub const fn new(first: u16, last: u16) -> Self {
        let (first, last) = normalize(first, last);
        Self { first, last }
    }

    #[inline]
    pub const fn first(&self) -> u16 {
        self.first
    }

    #[inline]
    pub const fn last(&self) -> u16 {
        self.last
    }

    /// Number of ports (ids) in the domain; `1..=65536`.
    #[inline]
    pub const fn elements(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    #[inline]
    pub const fn contains(&self, port: u16) -> bool {
        self.first <= port && port <= self.last
    }

    /// Map a port to its id, failing when it lies outside the domain.
    #[inline]
    pub fn to_id(&self, port: u16) -> Result<PortId, SetError> {
        if !self.contains(port) {
            return Err(SetError::range(port, self.first, self.last));
        }
        Ok(port - self.first)
    }

    /// Map an id back to its port.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `id` is outside `[0, elements)`.
    #[inline]
    pub fn from_id(&self, id: PortId) -> u16 {
        debug_assert!((id as usize) < self.elements(), "id out of domain");
        self.first + id
    }

    /// Resolve an inclusive port span to ids, swapping reversed endpoints.
    ///
    /// Both endpoints must fall inside the domain after the swap.
    pub fn id_span(&self, port: u16, port_to: u16) -> Result<RangeInclusive<PortId>, SetError> {
        let (lo, hi) = normalize(port, port_to);
        Ok(self.to_id(lo)?..=self.to_id(hi)?)
    }
}

/// Order two range endpoints ascending.
#[inline]
pub const fn normalize(first: u16, last: u16) -> (u16, u16) {
    if first > last {
        (last, first)
    } else {
        (first, last)
    }
}
