//! Quality Mask: 2 bits per block classifying media quality.
//!
//! Packed 32 blocks per `u64` word: `00` toxic, `01` bronze, `10` silver,
//! `11` gold. Read-only at steady state; a bad-block remap writer must take
//! a higher-level lock external to the allocator (`spec.md` §5).

use std::sync::atomic::{AtomicU64, Ordering};

/// A single block's media quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tier {
    /// Unusable; the ballistic allocator always skips it.
    Toxic = 0b00,
    /// Usable for user-data only; metadata-intent allocations skip it.
    Bronze = 0b01,
    /// Fully usable.
    Silver = 0b10,
    /// Fully usable, preferred.
    Gold = 0b11,
}

impl Tier {
    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0b00 => Self::Toxic,
            0b01 => Self::Bronze,
            0b10 => Self::Silver,
            _ => Self::Gold,
        }
    }
}

/// The Quality Mask: one `Tier` per block, packed 32-per-word.
///
/// Out-of-bounds access indicates geometry corruption and is a caller bug
/// that the allocator treats as fatal (`spec.md` §3); `get`/`set` panic on
/// OOB rather than returning a `Result`, mirroring how the bitmap operator
/// sets PANIC rather than fail-closed for this specific class of error.
pub struct QualityMask {
    words: Vec<AtomicU64>,
    total_blocks: u64,
}

impl QualityMask {
    /// Allocates a quality mask for `total_blocks`, every block starting as
    /// [`Tier::Gold`] (the permissive default; real deployments load this
    /// from persisted media-health data at mount).
    #[must_use]
    pub fn new(total_blocks: u64) -> Self {
        #[allow(clippy::cast_possible_truncation, reason = "block counts fit usize on 64-bit targets")]
        let word_count = (total_blocks as usize).div_ceil(32).max(1);
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || AtomicU64::new(u64::MAX));
        Self { words, total_blocks }
    }

    /// Whether `block` indexes a valid quality-mask entry.
    #[must_use]
    pub fn in_bounds(&self, block: u64) -> bool {
        block < self.total_blocks
    }

    /// Reads the tier of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is out of bounds.
    #[must_use]
    pub fn get(&self, block: u64) -> Tier {
        assert!(self.in_bounds(block), "quality mask access out of bounds: {block}");
        let word_idx = (block / 32) as usize;
        let shift = (block % 32) * 2;
        let word = self.words[word_idx].load(Ordering::Acquire);
        Tier::from_bits(word >> shift)
    }

    /// Sets the tier of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` is out of bounds.
    pub fn set(&self, block: u64, tier: Tier) {
        assert!(self.in_bounds(block), "quality mask access out of bounds: {block}");
        let word_idx = (block / 32) as usize;
        let shift = (block % 32) * 2;
        let mask = 0b11u64 << shift;
        let bits = (tier as u64) << shift;
        let word = &self.words[word_idx];
        let mut current = word.load(Ordering::Relaxed);
        loop {
            let next = (current & !mask) | bits;
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_gold() {
        let mask = QualityMask::new(100);
        assert_eq!(mask.get(0), Tier::Gold);
        assert_eq!(mask.get(99), Tier::Gold);
    }

    #[test]
    fn set_and_get_roundtrip_across_word_boundary() {
        let mask = QualityMask::new(100);
        mask.set(31, Tier::Toxic);
        mask.set(32, Tier::Bronze);
        assert_eq!(mask.get(31), Tier::Toxic);
        assert_eq!(mask.get(32), Tier::Bronze);
        // Neighboring entries are untouched.
        assert_eq!(mask.get(30), Tier::Gold);
        assert_eq!(mask.get(33), Tier::Gold);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn oob_get_panics() {
        let mask = QualityMask::new(10);
        let _ = mask.get(10);
    }
}
