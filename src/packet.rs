//! Packet-path queries against a set.
//!
//! The caller has already pulled the transport ports out of the packet
//! (host byte order); this module picks one by [`Direction`], then runs
//! the configured [`PacketAction`] with its counter and deadline side
//! effects.
//!
//! # Counter semantics on Test
//! On a match, the hit is accumulated first (unless `update_counters` is
//! off) and the optional [`CounterMatch`] conditions are then evaluated
//! against the updated totals. A failed condition turns the match into a
//! miss; the hit stays counted.
//!
//! # Timeout refresh on Test
//! A bare Test refreshes the entry's deadline only when `refresh_timeout`
//! is set. Control-plane Test never mutates.

use serde::{Deserialize, Serialize};

use crate::set::{AddExt, BitmapPortSet, SetError};

/// Which port of the packet the set is matched against.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Src = 0,
    Dst = 1,
}

/// Ports and length of one packet, as extracted by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketPorts {
    pub src: u16,
    pub dst: u16,
    /// Bytes credited to the byte counter on a counted hit.
    pub len: u64,
}

impl PacketPorts {
    #[inline]
    pub fn port(&self, dir: Direction) -> u16 {
        match dir {
            Direction::Src => self.src,
            Direction::Dst => self.dst,
        }
    }
}

/// What a match rule does with the packet's port.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PacketAction {
    #[default]
    Test = 0,
    Add = 1,
    Del = 2,
}

/// Comparison applied to a counter value.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterOp {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Gt = 3,
}

/// Condition `counter <op> value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterMatch {
    pub op: CounterOp,
    pub value: u64,
}

impl CounterMatch {
    #[inline]
    pub fn holds(&self, counter: u64) -> bool {
        match self.op {
            CounterOp::Eq => counter == self.value,
            CounterOp::Ne => counter != self.value,
            CounterOp::Lt => counter < self.value,
            CounterOp::Gt => counter > self.value,
        }
    }
}

/// Per-rule options for packet-path queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    pub direction: Direction,
    pub action: PacketAction,
    /// Timeout for Add (and Test refresh); falls back to the set default.
    pub timeout: Option<u32>,
    /// Add refreshes an existing entry instead of failing.
    pub exist: bool,
    /// Accumulate the hit on a Test match.
    pub update_counters: bool,
    /// Refresh the deadline on a Test match.
    pub refresh_timeout: bool,
    pub packets: Option<CounterMatch>,
    pub bytes: Option<CounterMatch>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Src,
            action: PacketAction::Test,
            timeout: None,
            exist: false,
            update_counters: true,
            refresh_timeout: false,
            packets: None,
            bytes: None,
        }
    }
}

impl BitmapPortSet {
    /// Run a packet-path query.
    ///
    /// Returns whether the packet matched (Test) or the mutation applied
    /// (Add/Del). A port outside the set's domain fails with
    /// `SetError::Range`; callers on the fast path usually treat that as a
    /// miss.
    pub fn match_packet(&self, pkt: &PacketPorts, opts: &MatchOptions) -> Result<bool, SetError> {
        let map = self.map();
        let port = pkt.port(opts.direction);
        let id = map.range.to_id(port)?;
        let now_ms = map.clock.now_ms();

        match opts.action {
            PacketAction::Test => {
                if !map.is_active(id, now_ms) {
                    return Ok(false);
                }
                let layout = map.ext.layout();
                if opts.refresh_timeout && layout.has_timeout() {
                    let timeout = opts.timeout.or(map.config.timeout).unwrap_or(0);
                    // A lapsed or claimed entry is left alone; the hit still counts.
                    map.ext.refresh(id, None, now_ms, timeout);
                }
                if !layout.has_counters() {
                    return Ok(true);
                }
                if opts.update_counters {
                    map.ext.accumulate(id, 1, pkt.len);
                }
                let Some(counters) = map.ext.read(id).counters else {
                    return Ok(true);
                };
                let packets_ok = opts.packets.map_or(true, |m| m.holds(counters.packets));
                let bytes_ok = opts.bytes.map_or(true, |m| m.holds(counters.bytes));
                Ok(packets_ok && bytes_ok)
            }
            PacketAction::Add => {
                // The triggering packet is the entry's first counted hit.
                let layout = map.ext.layout();
                let (packets, bytes) = if layout.has_counters() {
                    (Some(1), Some(pkt.len))
                } else {
                    (None, None)
                };
                let ext = AddExt {
                    timeout: opts.timeout.filter(|_| layout.has_timeout()),
                    packets,
                    bytes,
                };
                map.add_id(id, &ext, now_ms, opts.exist)?;
                Ok(true)
            }
            PacketAction::Del => {
                map.del_id(id, now_ms)?;
                Ok(true)
            }
        }
    }
}
