//! Lock-free [`AtomicBitSet`] backing set membership.
//!
//! # Invariants
//! - Bits are stored in `AtomicU64` words; padding bits beyond the logical
//!   capacity are zero (maintained by never setting them).
//! - `words.len() == words_for_bits(bit_length)`.
//!
//! # Ordering
//! Bit flips use `AcqRel` and reads use `Acquire`. Each bit guards a
//! per-index extension slot stored elsewhere; a reader that observes a set
//! bit must also observe the slot writes published before the flip that
//! cleared or set it.
//!
//! # Performance
//! - `test_and_set`, `test_and_clear`, `is_set` are O(1).
//! - `count`, `clear`, `ones` are O(WORDS).

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

use std::collections::TryReserveError;

/// Computes the number of `u64` words needed to store `n` bits.
pub const fn words_for_bits(n: usize) -> usize {
    n.div_ceil(64)
}

/// Lock-free bitset backed by a boxed slice of `AtomicU64`.
///
/// Multiple threads flip bits concurrently. `fetch_or` / `fetch_and`
/// guarantee that exactly one caller observes each transition of a bit, so
/// "was it already present" answers are exact under contention.
///
/// # Examples
///
/// ```
/// use portset_rs::stdx::atomic_bitset::AtomicBitSet;
///
/// let bits = AtomicBitSet::empty(128);
/// assert!(bits.test_and_set(42));    // first caller wins
/// assert!(!bits.test_and_set(42));   // second caller loses
/// assert!(bits.test_and_clear(42));  // was present
/// assert!(!bits.is_set(42));
/// ```
pub struct AtomicBitSet {
    words: Box<[AtomicU64]>,
    bit_length: usize,
}

impl std::fmt::Debug for AtomicBitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBitSet")
            .field("bit_length", &self.bit_length)
            .field("words_len", &self.words.len())
            .finish()
    }
}

impl AtomicBitSet {
    /// Creates an empty bitset with capacity for `bit_length` bits.
    ///
    /// # Panics
    ///
    /// Panics if `bit_length` is zero or the allocation fails. Use
    /// [`try_empty`](Self::try_empty) to observe allocation failure.
    pub fn empty(bit_length: usize) -> Self {
        match Self::try_empty(bit_length) {
            Ok(bits) => bits,
            Err(err) => panic!("AtomicBitSet allocation failed: {err}"),
        }
    }

    /// Fallible constructor: reports allocation failure instead of aborting.
    ///
    /// # Panics
    ///
    /// Panics if `bit_length` is zero (a zero-capacity bitset has no
    /// valid indices and is always a bug at the call site).
    pub fn try_empty(bit_length: usize) -> Result<Self, TryReserveError> {
        assert!(bit_length > 0, "AtomicBitSet requires bit_length > 0");
        let num_words = words_for_bits(bit_length);
        let mut words = Vec::new();
        words.try_reserve_exact(num_words)?;
        words.extend((0..num_words).map(|_| AtomicU64::new(0)));
        Ok(Self {
            words: words.into_boxed_slice(),
            bit_length,
        })
    }

    #[inline(always)]
    fn locate(&self, idx: usize) -> (usize, u64) {
        debug_assert!(idx < self.bit_length, "bit index out of bounds");
        (idx / 64, 1u64 << (idx % 64))
    }

    /// Atomically sets bit `idx` and returns `true` if it was previously unset.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `idx >= bit_length`.
    #[inline(always)]
    pub fn test_and_set(&self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        let prev = self.words[word].fetch_or(mask, Ordering::AcqRel);
        (prev & mask) == 0
    }

    /// Atomically clears bit `idx` and returns `true` if it was previously set.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `idx >= bit_length`.
    #[inline(always)]
    pub fn test_and_clear(&self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        let prev = self.words[word].fetch_and(!mask, Ordering::AcqRel);
        (prev & mask) != 0
    }

    /// Returns whether bit `idx` is set.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `idx >= bit_length`.
    #[inline(always)]
    pub fn is_set(&self, idx: usize) -> bool {
        let (word, mask) = self.locate(idx);
        (self.words[word].load(Ordering::Acquire) & mask) != 0
    }

    /// Resets all bits to zero.
    ///
    /// Each word is cleared atomically, but the bitset as a whole is not:
    /// a concurrent `test_and_set` may land before or after its word is
    /// cleared.
    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Release);
        }
    }

    /// Returns the number of addressable bits.
    #[inline]
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// Bytes held by the backing words.
    #[inline]
    pub fn memsize(&self) -> usize {
        self.words.len() * std::mem::size_of::<AtomicU64>()
    }

    /// Counts the number of set bits.
    ///
    /// Snapshot semantics: concurrent flips may or may not be reflected.
    #[inline]
    pub fn count(&self) -> usize {
        // Padding bits are never set, so no last-word mask is needed.
        self.words
            .iter()
            .map(|word| word.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Iterates over set bits in ascending order.
    ///
    /// Each word is loaded once when the iterator reaches it; bits flipped
    /// in words already visited are not reflected.
    #[inline]
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            bits: self,
            word_idx: 0,
            current: self.words[0].load(Ordering::Acquire),
        }
    }
}

/// Ascending iterator over the set bits of an [`AtomicBitSet`].
#[derive(Debug)]
pub struct Ones<'a> {
    bits: &'a AtomicBitSet,
    word_idx: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            if self.word_idx >= self.bits.words.len() {
                return None;
            }
            self.current = self.bits.words[self.word_idx].load(Ordering::Acquire);
        }
    }
}

// ---------------------------------------------------------------------------
// Test module includes
// ---------------------------------------------------------------------------

#[cfg(all(any(test, kani), not(loom)))]
#[path = "atomic_bitset_tests.rs"]
mod atomic_bitset_tests;

// ---------------------------------------------------------------------------
// Loom concurrency tests
// ---------------------------------------------------------------------------

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::thread;

    /// Two threads race to set the same bit; exactly one must win.
    #[test]
    fn concurrent_set_single_winner() {
        loom::model(|| {
            let bs = loom::sync::Arc::new(AtomicBitSet::empty(64));
            let bs2 = bs.clone();

            let h = thread::spawn(move || bs2.test_and_set(0));

            let won_main = bs.test_and_set(0);
            let won_thread = h.join().unwrap();

            assert!(
                won_main ^ won_thread,
                "exactly one caller must win: main={won_main}, thread={won_thread}"
            );
            assert!(bs.is_set(0));
        });
    }

    /// Two threads race to clear the same set bit; exactly one sees it present.
    #[test]
    fn concurrent_clear_single_winner() {
        loom::model(|| {
            let bs = loom::sync::Arc::new(AtomicBitSet::empty(64));
            bs.test_and_set(5);
            let bs2 = bs.clone();

            let h = thread::spawn(move || bs2.test_and_clear(5));

            let main = bs.test_and_clear(5);
            let other = h.join().unwrap();

            assert!(main ^ other, "exactly one clear must observe the bit");
            assert!(!bs.is_set(5));
        });
    }

    /// A set and a clear of neighbouring bits in one word never lose updates.
    #[test]
    fn set_and_clear_same_word() {
        loom::model(|| {
            let bs = loom::sync::Arc::new(AtomicBitSet::empty(64));
            bs.test_and_set(1);
            let bs2 = bs.clone();

            let h = thread::spawn(move || bs2.test_and_set(0));

            assert!(bs.test_and_clear(1));
            assert!(h.join().unwrap());

            assert!(bs.is_set(0));
            assert!(!bs.is_set(1));
            assert_eq!(bs.count(), 1);
        });
    }
}

// ---------------------------------------------------------------------------
// Concurrent smoke tests
// ---------------------------------------------------------------------------
