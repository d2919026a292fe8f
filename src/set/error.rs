//! Error type for bitmap:port set operations.
//!
//! All variants are surfaced unchanged to the control-plane or packet-path
//! caller. The enum is `#[non_exhaustive]`; consumers should include a
//! fallback match arm.
//!
//! # Design Notes
//! - `AlreadyExists` and `NotFound` form the "exists" class that bulk
//!   operations may swallow (see [`SetError::is_exists`]).
//! - Expiry is never an error; an expired entry is simply absent.

use std::fmt;
use std::io;

/// Errors from set creation and ADT operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum SetError {
    /// Malformed request that reached the core (e.g. a ranged Test).
    Protocol { detail: &'static str },
    /// Port (or a range endpoint) outside the configured domain.
    Range { port: u16, first: u16, last: u16 },
    /// Allocating the membership or extension region failed.
    OutOfMemory { bytes: usize },
    /// Add on a port that is already an active member.
    AlreadyExists { port: u16 },
    /// Delete on a port that is not an active member.
    NotFound { port: u16 },
    /// A per-entry timeout was given to a set created without timeout support.
    TimeoutNotSupported,
    /// Counter values were given to a set created without counter support.
    CountersNotSupported,
    /// The background reaper thread could not be started.
    ReaperSpawn(io::Error),
}

impl SetError {
    /// Whether this error is the tolerable "element already exists / missing"
    /// class that bulk Add/Delete swallow under `exists_ok`.
    #[inline]
    pub fn is_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::NotFound { .. })
    }

    #[inline]
    pub(crate) fn range(port: u16, first: u16, last: u16) -> Self {
        Self::Range { port, first, last }
    }
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol { detail } => write!(f, "protocol error: {detail}"),
            Self::Range { port, first, last } => {
                write!(f, "port {port} is outside the set range {first}-{last}")
            }
            Self::OutOfMemory { bytes } => {
                write!(f, "out of memory allocating {bytes} bytes for the set")
            }
            Self::AlreadyExists { port } => write!(f, "port {port} is already in the set"),
            Self::NotFound { port } => write!(f, "port {port} is not in the set"),
            Self::TimeoutNotSupported => {
                write!(f, "timeout cannot be used: set was created without timeout support")
            }
            Self::CountersNotSupported => {
                write!(f, "packet/byte counters cannot be used: set was created without counter support")
            }
            Self::ReaperSpawn(err) => write!(f, "failed to start the timeout reaper: {err}"),
        }
    }
}

impl std::error::Error for SetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReaperSpawn(err) => Some(err),
            _ => None,
        }
    }
}
