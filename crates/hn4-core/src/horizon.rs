//! Horizon Allocator: a strict O(1)-bounded ring allocator over
//! `[lba_horizon_start, journal_start)`, used as the fallback when the
//! ballistic orbit and Genesis draws cannot place a block (`spec.md`
//! §4.7).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitmap::{Bitmap, BitmapOp};
use crate::error::{BitmapStatus, HnError, HnResult};
use crate::flags::VolumeFlags;
use crate::l2::L2Summary;
use crate::quality::QualityMask;
use crate::sync::SpinLock;

/// Bounded probe budget: the Horizon never scans its entire ring.
/// `spec.md` §9 leaves the exact constant to the implementation, noting the
/// tests imply both `≤1024` and `≤128` in different paths; this picks the
/// larger, documented bound and applies it uniformly.
pub const P_HORIZON: u64 = 1024;

/// Monotonic ring write head and the geometry it indexes into.
pub struct Horizon {
    write_head: AtomicU64,
    lba_horizon_start: u64,
    cap: u64,
}

impl Horizon {
    /// Validates geometry and constructs a Horizon ring allocator.
    ///
    /// # Errors
    ///
    /// Returns `AlignmentFail` if `journal_start <= lba_horizon_start` or the
    /// block/sector sizes don't divide evenly.
    pub fn new(lba_horizon_start: u64, journal_start: u64, block_size: u32, sector_size: u32) -> HnResult<Self> {
        if journal_start <= lba_horizon_start {
            return Err(HnError::AlignmentFail);
        }
        if sector_size == 0 || block_size % sector_size != 0 {
            return Err(HnError::AlignmentFail);
        }
        Ok(Self { write_head: AtomicU64::new(0), lba_horizon_start, cap: journal_start - lba_horizon_start })
    }

    /// Current logical write head (monotonic, never reset).
    #[must_use]
    pub fn write_head(&self) -> u64 {
        self.write_head.load(Ordering::Relaxed)
    }

    /// Claims the next free ring slot, probing up to [`P_HORIZON`] times.
    ///
    /// # Errors
    ///
    /// Returns `EnoSpc` once the bounded probe budget is exhausted, or
    /// whatever [`Bitmap::bitmap_op`] surfaces for the probed slots.
    pub fn alloc(
        &self,
        bitmap: &Bitmap,
        quality: &QualityMask,
        l2: &L2Summary,
        flags: &SpinLock<VolumeFlags>,
        strict_audit: bool,
    ) -> HnResult<u64> {
        let start_head = self.write_head.fetch_add(1, Ordering::Relaxed);
        let start_wrap = start_head / self.cap;

        for probe in 0..P_HORIZON {
            let head = start_head.wrapping_add(probe);
            let idx = head % self.cap;
            let lba = self.lba_horizon_start + idx;
            let wrap = head / self.cap;

            if let (BitmapStatus::Ok | BitmapStatus::Healed, true) =
                bitmap.bitmap_op(quality, l2, flags, lba, BitmapOp::Set, false, strict_audit)?
            {
                // Only an actual placement justifies dirtying the volume;
                // a wrap crossed while merely scanning a full ring must not
                // (spec.md §4.7 step 5: a full-ring scan that places nothing
                // leaves the volume CLEAN).
                if wrap != start_wrap {
                    flags.lock().insert(VolumeFlags::DIRTY);
                }
                if probe > 0 {
                    // Advance the shared head past the probes we burned
                    // so the next caller doesn't repeat our collisions.
                    self.write_head.fetch_add(probe, Ordering::Relaxed);
                }
                return Ok(lba);
            }
        }
        Err(HnError::EnoSpc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(cap: u64) -> (Horizon, Bitmap, QualityMask, L2Summary, SpinLock<VolumeFlags>) {
        let total = 100 + cap;
        (
            Horizon::new(100, 100 + cap, 4096, 512).unwrap(),
            Bitmap::new(total, 0),
            QualityMask::new(total),
            L2Summary::new(total),
            SpinLock::new(VolumeFlags::default()),
        )
    }

    #[test]
    fn allocates_sequential_slots() {
        let (h, bm, q, l2, flags) = fixture(10);
        let a = h.alloc(&bm, &q, &l2, &flags, false).unwrap();
        let b = h.alloc(&bm, &q, &l2, &flags, false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn scenario_s6_bounded_probe_enospc_on_full_ring() {
        let (h, bm, q, l2, flags) = fixture(10);
        for _ in 0..10 {
            h.alloc(&bm, &q, &l2, &flags, false).unwrap();
        }
        // The fill above legitimately dirtied the volume (real SETs); clear
        // it so the failed scan below can't hide behind that pre-existing
        // state.
        flags.lock().remove(VolumeFlags::DIRTY);
        let before = bm.used_blocks();
        let err = h.alloc(&bm, &q, &l2, &flags, false).unwrap_err();
        assert_eq!(err, HnError::EnoSpc);
        assert_eq!(bm.used_blocks(), before);
        // A full-ring scan that places nothing must leave the volume CLEAN,
        // even though the probe loop crosses the wrap boundary many times.
        assert!(!flags.lock().contains(VolumeFlags::DIRTY));
    }

    #[test]
    fn rejects_bad_geometry() {
        assert_eq!(Horizon::new(100, 100, 4096, 512).err(), Some(HnError::AlignmentFail));
        assert_eq!(Horizon::new(100, 200, 4096, 0).err(), Some(HnError::AlignmentFail));
        assert_eq!(Horizon::new(100, 200, 4097, 512).err(), Some(HnError::AlignmentFail));
    }

    #[test]
    fn head_wraps_cleanly_at_u64_max() {
        let h = Horizon { write_head: AtomicU64::new(u64::MAX), lba_horizon_start: 0, cap: 10 };
        let bm = Bitmap::new(10, 0);
        let q = QualityMask::new(10);
        let l2 = L2Summary::new(10);
        let flags = SpinLock::new(VolumeFlags::default());
        let lba = h.alloc(&bm, &q, &l2, &flags, false).unwrap();
        assert!(lba < 10);
        let lba2 = h.alloc(&bm, &q, &l2, &flags, false).unwrap();
        assert!(lba2 < 10);
    }
}
