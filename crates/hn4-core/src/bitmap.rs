//! Bitmap Operator: the single serialization point for bitmap mutation.
//!
//! `_bitmap_op(block, op)` is implemented here as [`Bitmap::bitmap_op`],
//! following the seven-step design in `spec.md` §4.2: resolve, armored
//! load + ECC heal, L2 consult, compute next state, CAS writeback, counter
//! and L2 update, dirty-flag policy.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::armored_word::ArmoredWordData;
use crate::ecc::{self, Decoded};
use crate::error::{BitmapStatus, HnError, HnResult};
use crate::flags::VolumeFlags;
use crate::l2::{L2Summary, REGION_BITS, REGION_WORDS};
use crate::quality::QualityMask;
use crate::sync::SpinLock;
use crate::{hn4err, hn4warn};

/// The operation requested of [`Bitmap::bitmap_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapOp {
    /// Read the bit without mutating anything.
    Test,
    /// Claim the bit (0→1).
    Set,
    /// Release the bit (1→0), subject to the dirty-flag double-free policy.
    Clear,
    /// Unconditionally clear the bit; never sets DIRTY. Used to roll back a
    /// speculative allocation.
    ForceClear,
}

/// The error-correcting, L2-summarized, quality-masked bitmap.
pub struct Bitmap {
    words: Vec<SpinLock<ArmoredWordData>>,
    total_blocks: u64,
    uuid_mask56: u64,
    used_blocks: AtomicU64,
    heal_count: AtomicU64,
}

impl Bitmap {
    /// Allocates an all-clear bitmap covering `total_blocks`, with the
    /// version-mux XOR mask fixed to `uuid_mask56` for the volume's
    /// lifetime (`spec.md` §6).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "block counts fit usize on 64-bit targets")]
    pub fn new(total_blocks: u64, uuid_mask56: u64) -> Self {
        let word_count = (total_blocks as usize).div_ceil(64).max(1);
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || SpinLock::new(ArmoredWordData::zeroed()));
        Self { words, total_blocks, uuid_mask56, used_blocks: AtomicU64::new(0), heal_count: AtomicU64::new(0) }
    }

    /// Total blocks this bitmap covers.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Current used-block count.
    #[must_use]
    pub fn used_blocks(&self) -> u64 {
        self.used_blocks.load(Ordering::Relaxed)
    }

    /// Current heal telemetry counter.
    #[must_use]
    pub fn heal_count(&self) -> u64 {
        self.heal_count.load(Ordering::Relaxed)
    }

    /// Encodes `block`'s word into its on-disk, version-muxed
    /// representation (`spec.md` §6), for callers persisting the bitmap to
    /// the HAL's backing store.
    #[must_use]
    pub fn raw_word(&self, block: u64) -> crate::armored_word::RawArmoredWord {
        let word_idx = (block / 64) as usize;
        self.words[word_idx].lock().to_raw(self.uuid_mask56)
    }

    /// Snapshots the 8 bitmap words of the L2 region covering `block`, for
    /// use by [`L2Summary::maybe_clear`]. Load-acquire per word so the scan
    /// observes any writer that released before this call.
    #[allow(clippy::cast_possible_truncation, reason = "word indices fit usize on 64-bit targets")]
    fn region_snapshot(&self, region: u64) -> Vec<u64> {
        let first_word = region * REGION_WORDS;
        (0..REGION_WORDS)
            .map(|i| {
                let idx = (first_word + i) as usize;
                self.words.get(idx).map_or(0, |w| w.lock().data)
            })
            .collect()
    }

    /// The single mutation primitive. Returns `(status, changed)` per
    /// `spec.md` §4.2, or an `HnError` on failure.
    ///
    /// `read_only` suppresses ECC-heal writeback (the corrected view is
    /// still returned/observed in the status, but RAM is not mutated) and
    /// rejects logical mutations with `AccessDenied`.
    ///
    /// # Errors
    ///
    /// Returns `Geometry` if `block` is out of bounds, `BitmapCorrupt` on an
    /// uncorrectable ECC error, or `AccessDenied` for a mutating op on a
    /// read-only volume.
    #[allow(clippy::too_many_arguments, reason = "mirrors spec.md's bitmap operator signature")]
    pub fn bitmap_op(
        &self,
        quality: &QualityMask,
        l2: &L2Summary,
        flags: &SpinLock<VolumeFlags>,
        block: u64,
        op: BitmapOp,
        read_only: bool,
        strict_audit: bool,
    ) -> HnResult<(BitmapStatus, bool)> {
        // Step 1: resolve.
        if block >= self.total_blocks {
            // Plain caller bug (index past the bitmap's declared range):
            // fail-closed without PANIC.
            return Err(HnError::Geometry);
        }
        if !quality.in_bounds(block) {
            // Within the bitmap's range but the quality mask doesn't cover
            // it: the two are supposed to share geometry, so this means
            // geometry corruption. Fatal.
            flags.lock().insert(VolumeFlags::PANIC);
            hn4err!("quality mask OOB at block {block}");
            return Err(HnError::Geometry);
        }
        let word_idx = (block / 64) as usize;
        let bit_mask = 1u64 << (block % 64);
        let region = block / REGION_BITS;

        // The spinlock grants exclusive access to this word for the
        // remainder of the call, giving us the wide atomic read-modify-
        // write `spec.md` §5 asks for without a CAS-retry loop: there is no
        // contending writer to race once the guard is held.
        let mut guard = self.words[word_idx].lock();

        // Step 2: armored load + ECC decode.
        let (mut data, healed_now) = match ecc::decode(guard.data, guard.ecc) {
            Decoded::Clean => (guard.data, false),
            Decoded::Healed { data, ecc } => {
                if read_only {
                    // Return the corrected view; suppress writeback.
                    (data, false)
                } else {
                    guard.data = data;
                    guard.ecc = ecc;
                    guard.version = guard.version.wrapping_add(1);
                    self.heal_count.fetch_add(1, Ordering::Relaxed);
                    hn4warn!("healed single-bit ECC error in word {word_idx}");
                    (data, true)
                }
            }
            Decoded::Uncorrectable => {
                flags.lock().insert(VolumeFlags::PANIC);
                hn4err!("uncorrectable ECC error in word {word_idx}");
                return Err(HnError::BitmapCorrupt);
            }
        };

        let old_bit = data & bit_mask != 0;

        // Step 3: consult L2 for SET (false-negative repair).
        if op == BitmapOp::Set && old_bit && !l2.test(region) {
            l2.set(region);
        }

        if op == BitmapOp::Test {
            // Read-only: never mutates DIRTY or counters. A heal that
            // occurred above on a writable volume has already been
            // committed to `guard`; on a read-only volume it was
            // suppressed.
            let status = if healed_now { BitmapStatus::Healed } else { BitmapStatus::Ok };
            return Ok((status, old_bit));
        }

        if read_only {
            return Err(HnError::AccessDenied);
        }

        // Step 4: compute next state.
        let (new_bit, changed) = match op {
            BitmapOp::Test => unreachable!("handled above"),
            BitmapOp::Set => (true, !old_bit),
            BitmapOp::Clear | BitmapOp::ForceClear => (false, old_bit),
        };
        if new_bit != old_bit {
            data = if new_bit { data | bit_mask } else { data & !bit_mask };
        }

        // Step 5: writeback. Healing and the logical data change coalesce
        // into this single update of the armored word.
        let next_ecc = ecc::hamming(data);
        guard.data = data;
        guard.ecc = next_ecc;
        guard.version = guard.version.wrapping_add(1);
        drop(guard);

        // Step 6: counters & L2.
        if changed && op == BitmapOp::Set {
            self.used_blocks.fetch_add(1, Ordering::Relaxed);
            l2.set(region);
        } else if changed && matches!(op, BitmapOp::Clear | BitmapOp::ForceClear) {
            self.guarded_decrement(flags);
            let snapshot = self.region_snapshot(region);
            l2.maybe_clear(region, &snapshot);
        }

        // Step 7: dirty-flag policy.
        let sets_dirty = match op {
            BitmapOp::ForceClear | BitmapOp::Test => false,
            BitmapOp::Set => changed,
            BitmapOp::Clear => {
                if changed {
                    true
                } else {
                    strict_audit
                }
            }
        };
        if sets_dirty {
            flags.lock().insert(VolumeFlags::DIRTY);
        }

        let status = if healed_now { BitmapStatus::Healed } else { BitmapStatus::Ok };
        Ok((status, changed))
    }

    /// Decrements `used_blocks`, refusing to underflow. On an attempted
    /// underflow, leaves the counter at 0 and sets DIRTY (state drift
    /// detected) rather than wrapping.
    fn guarded_decrement(&self, flags: &SpinLock<VolumeFlags>) {
        let mut current = self.used_blocks.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                flags.lock().insert(VolumeFlags::DIRTY);
                return;
            }
            match self.used_blocks.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Directly loads a word's data (for test fixtures that need to jam a
    /// bit without going through the full operator).
    #[cfg(test)]
    pub(crate) fn poke(&self, block: u64, data: u64, ecc: u8) {
        let word_idx = (block / 64) as usize;
        let mut guard = self.words[word_idx].lock();
        guard.data = data;
        guard.ecc = ecc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(total_blocks: u64) -> (Bitmap, QualityMask, L2Summary, SpinLock<VolumeFlags>) {
        (
            Bitmap::new(total_blocks, 0),
            QualityMask::new(total_blocks),
            L2Summary::new(total_blocks),
            SpinLock::new(VolumeFlags::default()),
        )
    }

    #[test]
    fn raw_word_roundtrips_with_version_mux() {
        let bm = Bitmap::new(1000, 0x00AB_CDEF);
        let q = QualityMask::new(1000);
        let l2 = L2Summary::new(1000);
        let flags = SpinLock::new(VolumeFlags::default());
        bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Set, false, false).unwrap();
        let raw = bm.raw_word(5);
        let decoded = ArmoredWordData::from_raw(raw, 0x00AB_CDEF);
        assert_eq!(decoded.data & (1 << 5), 1 << 5);
    }

    #[test]
    fn set_then_set_is_idempotent() {
        let (bm, q, l2, flags) = fixture(1000);
        let (status, changed) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Set, false, false).unwrap();
        assert_eq!(status, BitmapStatus::Ok);
        assert!(changed);
        assert_eq!(bm.used_blocks(), 1);
        let (_, changed2) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Set, false, false).unwrap();
        assert!(!changed2);
        assert_eq!(bm.used_blocks(), 1);
        assert!(l2.test(0));
    }

    #[test]
    fn clear_on_clear_bit_is_benign_in_production() {
        let (bm, q, l2, flags) = fixture(1000);
        let (_, changed) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Clear, false, false).unwrap();
        assert!(!changed);
        assert!(!flags.lock().contains(VolumeFlags::DIRTY));
    }

    #[test]
    fn clear_on_clear_bit_sets_dirty_in_strict_audit() {
        let (bm, q, l2, flags) = fixture(1000);
        let (_, changed) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Clear, false, true).unwrap();
        assert!(!changed);
        assert!(flags.lock().contains(VolumeFlags::DIRTY));
    }

    #[test]
    fn force_clear_never_sets_dirty() {
        let (bm, q, l2, flags) = fixture(1000);
        bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Set, false, false).unwrap();
        flags.lock().remove(VolumeFlags::DIRTY);
        let (_, changed) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::ForceClear, false, false).unwrap();
        assert!(changed);
        assert!(!flags.lock().contains(VolumeFlags::DIRTY));
        assert_eq!(bm.used_blocks(), 0);
    }

    #[test]
    fn oob_block_fails_closed_without_panic() {
        let (bm, q, l2, flags) = fixture(10);
        let err = bm.bitmap_op(&q, &l2, &flags, 10_000, BitmapOp::Test, false, false).unwrap_err();
        assert_eq!(err, HnError::Geometry);
        assert!(!flags.lock().contains(VolumeFlags::PANIC));
    }

    #[test]
    fn test_never_mutates_state() {
        let (bm, q, l2, flags) = fixture(1000);
        bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Set, false, false).unwrap();
        flags.lock().remove(VolumeFlags::DIRTY);
        let before = bm.used_blocks();
        bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Test, false, false).unwrap();
        assert_eq!(bm.used_blocks(), before);
        assert!(!flags.lock().contains(VolumeFlags::DIRTY));
    }

    #[test]
    fn ecc_heal_on_test_reports_healed_and_persists() {
        let (bm, q, l2, flags) = fixture(1000);
        let data = 0xCAFE_BABE_u64;
        let ecc = ecc::hamming(data) ^ 0x80; // flip the global parity bit
        bm.poke(5, data, ecc);
        let (status, bit) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Test, false, false).unwrap();
        assert_eq!(status, BitmapStatus::Healed);
        assert_eq!(bm.heal_count(), 1);
        assert!(bit); // bit 5 of 0xCAFE_BABE is set
        // Reading again should now be clean.
        let (status2, _) = bm.bitmap_op(&q, &l2, &flags, 5, BitmapOp::Test, false, false).unwrap();
        assert_eq!(status2, BitmapStatus::Ok);
    }

    #[test]
    fn false_negative_l2_self_heals_on_set() {
        let (bm, q, l2, flags) = fixture(1000);
        bm.poke(0, 1, ecc::hamming(1));
        assert!(!l2.test(0));
        let (_, changed) = bm.bitmap_op(&q, &l2, &flags, 0, BitmapOp::Set, false, false).unwrap();
        assert!(!changed);
        assert!(l2.test(0));
    }

    #[test]
    fn concurrent_sets_on_same_bit_increment_used_blocks_once() {
        use std::sync::Arc;
        use std::thread;

        let bm = Arc::new(Bitmap::new(1000, 0));
        let q = Arc::new(QualityMask::new(1000));
        let l2 = Arc::new(L2Summary::new(1000));
        let flags = Arc::new(SpinLock::new(VolumeFlags::default()));

        let mut handles = Vec::new();
        let changed_count = Arc::new(AtomicU64::new(0));
        for _ in 0..8 {
            let bm = Arc::clone(&bm);
            let q = Arc::clone(&q);
            let l2 = Arc::clone(&l2);
            let flags = Arc::clone(&flags);
            let changed_count = Arc::clone(&changed_count);
            handles.push(thread::spawn(move || {
                let (_, changed) = bm.bitmap_op(&q, &l2, &flags, 42, BitmapOp::Set, false, false).unwrap();
                if changed {
                    changed_count.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(changed_count.load(Ordering::Relaxed), 1);
        assert_eq!(bm.used_blocks(), 1);
    }
}
