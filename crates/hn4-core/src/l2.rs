//! L2 Summary: one bit per 512-block region, an advisory skip hint over the
//! bitmap (`spec.md` §4.3).
//!
//! Safety property: "L2 bit clear ⇒ region empty" is *eventually* true, not
//! instantaneously — a `Set` can race a concurrent `MaybeClear`'s scan. The
//! allocator must never trust `L2 == clear` as authoritative for a `SET`;
//! [`crate::bitmap::Bitmap::bitmap_op`] re-derives truth from the bitmap
//! words themselves and only uses L2 to repair false negatives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of bitmap bits summarized by one L2 region.
pub const REGION_BITS: u64 = 512;
/// Number of 64-bit bitmap words per L2 region.
pub const REGION_WORDS: u64 = REGION_BITS / 64;

/// The L2 Summary bit array.
pub struct L2Summary {
    words: Vec<AtomicU64>,
    region_count: u64,
}

impl L2Summary {
    /// Allocates an all-clear L2 summary covering `total_blocks` bitmap bits.
    #[must_use]
    pub fn new(total_blocks: u64) -> Self {
        let region_count = total_blocks.div_ceil(REGION_BITS).max(1);
        #[allow(clippy::cast_possible_truncation, reason = "region counts fit usize on 64-bit targets")]
        let word_count = (region_count as usize).div_ceil(64).max(1);
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || AtomicU64::new(0));
        Self { words, region_count }
    }

    /// Number of regions tracked.
    #[must_use]
    pub fn region_count(&self) -> u64 {
        self.region_count
    }

    /// Idempotent atomic OR: marks region `r` as possibly-occupied.
    pub fn set(&self, r: u64) {
        let (word_idx, bit) = Self::locate(r);
        self.words[word_idx].fetch_or(bit, Ordering::Release);
    }

    /// Plain atomic load: an advisory skip hint, never authoritative.
    #[must_use]
    pub fn test(&self, r: u64) -> bool {
        let (word_idx, bit) = Self::locate(r);
        self.words[word_idx].load(Ordering::Acquire) & bit != 0
    }

    /// Scans the region's bitmap words (supplied by the caller, since L2
    /// has no reference to the bitmap itself) and clears the region bit iff
    /// all are zero. `region_words` must be a load-acquire snapshot of the
    /// region's bitmap words, taken by the caller, so that a concurrent
    /// `Set` racing this scan is never lost: the caller reads the bitmap
    /// words first (acquire), then this function CASes the L2 word,
    /// guaranteeing any writer that set a bit before our read also sees it
    /// reflected in `region_words`, while any writer racing after our read
    /// will still observe and retry against our (still-unset) L2 bit via
    /// its own `set` call.
    pub fn maybe_clear(&self, r: u64, region_words: &[u64]) {
        if region_words.iter().any(|&w| w != 0) {
            return;
        }
        let (word_idx, bit) = Self::locate(r);
        let word = &self.words[word_idx];
        let mut current = word.load(Ordering::Acquire);
        loop {
            if current & bit == 0 {
                return;
            }
            let next = current & !bit;
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    fn locate(r: u64) -> (usize, u64) {
        ((r / 64) as usize, 1u64 << (r % 64))
    }
}
