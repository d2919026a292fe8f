//! Small, self-contained building blocks used by the set type.

pub mod atomic_bitset;
pub mod clock;

pub use atomic_bitset::{words_for_bits, AtomicBitSet};
pub use clock::{Clock, ManualClock, MonotonicClock};
