//! Cortex Slot Allocator: packs fixed-size slots inside the reserved
//! metadata region `[lba_cortex_start, lba_bitmap_start)`, using the L2
//! summary as an O(1) skip hint over full regions (`spec.md` §4.8).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{HnError, HnResult};
use crate::l2::{L2Summary, REGION_BITS};

/// Size in bytes of a single Cortex slot.
pub const SLOT_SIZE: u64 = 128;

/// In-memory bump allocator over the Cortex region.
pub struct Cortex {
    search_head: AtomicU64,
    region_start_block: u64,
    region_len_blocks: u64,
}

impl Cortex {
    /// Creates a Cortex allocator over `[start_block, start_block +
    /// len_blocks)`, expressed in slot units (a slot is assumed to be
    /// block-sized here; callers mapping to a sub-block slot size convert
    /// before calling).
    #[must_use]
    pub fn new(start_block: u64, len_blocks: u64) -> Self {
        Self { search_head: AtomicU64::new(0), region_start_block: start_block, region_len_blocks: len_blocks }
    }

    /// Allocates a run of `slots` contiguous slots, skipping over L2-marked
    /// full regions. Returns the starting slot index (relative to the
    /// Cortex region).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero-length run, or `EnoSpc` once the
    /// region is exhausted.
    pub fn alloc_run(&self, slots: u64, l2: &L2Summary) -> HnResult<u64> {
        if slots == 0 {
            return Err(HnError::InvalidArgument);
        }
        loop {
            let head = self.search_head.load(Ordering::Relaxed);
            if head + slots > self.region_len_blocks {
                return Err(HnError::EnoSpc);
            }

            let region = (self.region_start_block + head) / REGION_BITS;
            if l2.test(region) {
                // Region is marked possibly-full; skip to its end rather
                // than probing slot-by-slot.
                let region_end_block = (region + 1) * REGION_BITS - self.region_start_block;
                let _ = self.search_head.compare_exchange_weak(
                    head,
                    region_end_block,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                continue;
            }

            let next = head + slots;
            if self
                .search_head
                .compare_exchange_weak(head, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(head);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumps_head_by_slot_count() {
        let cortex = Cortex::new(0, 10_000);
        let l2 = L2Summary::new(10_000);
        let a = cortex.alloc_run(4, &l2).unwrap();
        let b = cortex.alloc_run(4, &l2).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 4);
    }

    #[test]
    fn exhausted_region_returns_enospc() {
        let cortex = Cortex::new(0, 10);
        let l2 = L2Summary::new(10);
        let _ = cortex.alloc_run(8, &l2).unwrap();
        let err = cortex.alloc_run(8, &l2).unwrap_err();
        assert_eq!(err, HnError::EnoSpc);
    }

    #[test]
    fn skips_l2_marked_full_region() {
        let cortex = Cortex::new(0, 2000);
        let l2 = L2Summary::new(2000);
        l2.set(0); // region 0 covers blocks [0, 512)
        let head = cortex.alloc_run(4, &l2).unwrap();
        assert!(head >= 512);
    }
}
