//! Background eviction of expired entries.
//!
//! # State machine
//! ```text
//!   create (timeout layout) ──> Armed ──(tick: sweep, re-arm)──> Armed
//!   create (no timeout)     ──> Idle
//!   drop                    ──> stop signal, join ──> (memory released)
//! ```
//!
//! The reaper owns an `Arc` of the set's storage, and the owning
//! [`BitmapPortSet`](super::BitmapPortSet) joins the thread on drop. The
//! storage therefore cannot be released while a sweep is running.
//!
//! # Races with Add
//! A sweep evicts an id only while holding its slot claim, taken by
//! compare-exchange on a deadline that has lapsed. An Add that refreshed the
//! deadline first makes the claim fail and the entry survives. An Add that
//! arrives during the claim waits for the release and then starts a fresh
//! entry, so an acknowledged Add is never cleared by a sweep before its
//! own deadline.

use std::io;
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as chan, RecvTimeoutError};
use tracing::{debug, trace};

use super::extension::{lapsed, DEADLINE_UNSET};
use super::range::PortId;
use super::PortMap;

/// Whether a set has a periodic sweep scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaperState {
    /// No timer armed; the set has no timeout layout.
    Idle,
    /// Periodic sweep scheduled.
    Armed,
}

impl PortMap {
    /// Evict every id whose deadline is at or before `now_ms`.
    ///
    /// Serialized against other sweeps of the same set; runs concurrently
    /// with Test/Add/Delete. Returns the number of evicted ids.
    pub(crate) fn sweep(&self, now_ms: u64) -> usize {
        if !self.ext.layout().has_timeout() {
            return 0;
        }
        let _guard = self
            .sweep_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut evicted = 0usize;
        for idx in self.members.ones() {
            let id = idx as PortId;
            // A slot claimed elsewhere is being restarted or removed already.
            if self
                .ext
                .claim(id, false, |deadline| lapsed(deadline, now_ms))
                .is_none()
            {
                continue;
            }
            self.ext.set_counters(id, Some(0), Some(0));
            if self.members.test_and_clear(idx) {
                evicted += 1;
            }
            self.ext.release(id, DEADLINE_UNSET);
        }
        evicted
    }
}

/// Handle to the sweep thread of one set.
#[derive(Debug)]
pub(crate) struct Reaper {
    stop: Option<chan::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Reaper {
    /// Start sweeping `map` every `interval`.
    pub(crate) fn spawn(map: Arc<PortMap>, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = chan::bounded::<()>(1);
        let name = format!("portset-reaper-{}-{}", map.range.first(), map.range.last());
        let handle = thread::Builder::new().name(name).spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let evicted = map.sweep(map.clock.now_ms());
                    trace!(evicted, "reaper sweep");
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;
        debug!(interval_ms = interval.as_millis() as u64, "reaper armed");
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    #[inline]
    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the thread and wait for any in-flight sweep to finish.
    pub(crate) fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
