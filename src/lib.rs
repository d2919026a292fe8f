//! Fixed-range port set with lock-free membership, per-entry extensions,
//! and lazy expiry.
//!
//! ## Scope
//! This crate implements the `bitmap:port` set type of a packet-filtering
//! framework: a set of TCP/UDP port numbers drawn from one contiguous
//! range, tested and mutated concurrently from control-plane handlers and
//! per-packet fast paths.
//!
//! ## Key invariants
//! - Every port in `[first_port, last_port]` maps to exactly one dense id;
//!   ports outside the range are rejected before any state is touched.
//! - Membership is one bit per id, flipped with single atomic operations.
//!   No lock guards Test/Add/Delete.
//! - An entry is active iff its bit is set and its deadline (if any) has not
//!   passed. Reads apply expiry lazily; a background reaper clears lapsed
//!   bits.
//! - The extension layout (none, timeout, counters, both) is chosen at
//!   creation and fixed for the set's lifetime.
//!
//! ## Notable entry points
//! - [`BitmapPortSet`]: create, Test/Add/Delete/List/Head/Flush, gc.
//! - [`SetConfig`] / [`CreateOptions`]: configuration and runtime knobs.
//! - [`packet`]: packet-path match surface (direction, counters, refresh).
//! - [`command`]: decoded control-plane commands and replies.
//! - [`same_config`]: swap compatibility of two sets.

pub mod command;
pub mod packet;
pub mod set;
pub mod stdx;
#[cfg(test)]
pub mod test_utils;

pub use command::{AdtCmd, CreateCmd, ListReply, Reply};
pub use packet::{CounterMatch, CounterOp, Direction, MatchOptions, PacketAction, PacketPorts};
pub use set::{
    same_config, AddExt, BitmapPortSet, Counters, CreateOptions, Entry, ExtLayout, ExtSnapshot,
    RangeIndex, ReAddCounters, ReaperState, SetConfig, SetError, SetHeader, SetPolicy,
};
pub use stdx::clock::{Clock, ManualClock, MonotonicClock};
