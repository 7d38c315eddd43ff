//! The `Volume` handle: owns geometry, bitmap, L2 summary, quality mask,
//! counters and flags for a mounted HN4 volume, and exposes the public
//! allocation/free API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hn4_hal::{ChronicleGeometry, DeviceTypeTag, EpochGeometry, FormatProfile, HalDevice, Superblock};

use crate::anchor::Anchor;
use crate::ballistic::{self, BallisticContext, Route};
use crate::bitmap::{Bitmap, BitmapOp};
use crate::cortex::Cortex;
use crate::error::{BitmapStatus, HnError, HnResult, Placement, Status};
use crate::flags::VolumeFlags;
use crate::genesis::{self, Affinity, RandomSource};
use crate::horizon::Horizon;
use crate::l2::L2Summary;
use crate::quality::QualityMask;
use crate::saturation::{self, GateDecision};
use crate::sync::SpinLock;
use crate::trajectory::Damping;
use crate::{hn4fatal, hn4info};

/// Threshold of out-of-bounds free attempts before the volume enters PANIC
/// (`spec.md` §4.10).
pub const OOB_FREE_PANIC_THRESHOLD: u64 = 20;

struct HalRandom<'a>(&'a dyn HalDevice);
impl RandomSource for HalRandom<'_> {
    fn random_u64(&self) -> u64 {
        self.0.random_u64()
    }
}

/// A mounted HN4 volume.
pub struct Volume {
    hal: Arc<dyn HalDevice>,
    device_type_tag: DeviceTypeTag,
    format_profile: FormatProfile,
    flux_start_blk: u64,
    total_blocks: u64,

    bitmap: Bitmap,
    l2: L2Summary,
    quality: QualityMask,
    horizon: Horizon,
    cortex: Cortex,
    flags: SpinLock<VolumeFlags>,

    last_alloc_g: AtomicU64,
    oob_free_count: AtomicU64,

    read_only: bool,
    is_snapshot: bool,
    strict_audit: bool,
}

impl Volume {
    /// Mounts a volume from a [`Superblock`], validating geometry and, if
    /// supplied, confirming the Chronicle and Epoch regions do not overlap
    /// the ballistic, Horizon, or Cortex regions the allocator owns.
    ///
    /// # Errors
    ///
    /// Returns `AlignmentFail`/`BadSuperblock` for invalid or overlapping
    /// geometry.
    pub fn mount(
        hal: Arc<dyn HalDevice>,
        superblock: &Superblock,
        chronicle: Option<ChronicleGeometry>,
        epoch: Option<EpochGeometry>,
        read_only: bool,
        is_snapshot: bool,
    ) -> HnResult<Self> {
        let g = superblock.geometry;
        if g.block_size == 0 || g.sector_size == 0 || g.block_size % g.sector_size != 0 {
            return Err(HnError::AlignmentFail);
        }
        if g.lba_flux_start >= g.total_blocks {
            return Err(HnError::BadSuperblock);
        }
        if g.lba_cortex_start >= g.lba_bitmap_start {
            return Err(HnError::BadSuperblock);
        }
        if g.lba_horizon_start >= g.journal_start {
            return Err(HnError::BadSuperblock);
        }

        let ballistic_region = (g.lba_flux_start, g.total_blocks);
        let horizon_region = (g.lba_horizon_start, g.journal_start);
        let cortex_region = (g.lba_cortex_start, g.lba_bitmap_start);
        for region in [ballistic_region, horizon_region, cortex_region] {
            if let Some(c) = chronicle {
                if overlaps(region, (c.start, c.start + c.len)) {
                    return Err(HnError::BadSuperblock);
                }
            }
            if let Some(e) = epoch {
                if overlaps(region, (e.start, e.start + e.len)) {
                    return Err(HnError::BadSuperblock);
                }
            }
        }

        let horizon = Horizon::new(g.lba_horizon_start, g.journal_start, g.block_size, g.sector_size)?;
        let cortex = Cortex::new(g.lba_cortex_start, g.lba_bitmap_start - g.lba_cortex_start);

        hn4info!("mounted volume: {} total blocks, profile {:?}", g.total_blocks, superblock.format_profile);

        Ok(Self {
            hal,
            device_type_tag: superblock.device_type_tag,
            format_profile: superblock.format_profile,
            flux_start_blk: g.lba_flux_start,
            total_blocks: g.total_blocks,
            bitmap: Bitmap::new(g.total_blocks, superblock.uuid_low56),
            l2: L2Summary::new(g.total_blocks),
            quality: QualityMask::new(g.total_blocks),
            horizon,
            cortex,
            flags: SpinLock::new(VolumeFlags::default()),
            last_alloc_g: AtomicU64::new(0),
            oob_free_count: AtomicU64::new(0),
            read_only,
            is_snapshot,
            strict_audit: cfg!(feature = "strict-audit"),
        })
    }

    fn is_hdd_like(&self) -> bool {
        self.device_type_tag == DeviceTypeTag::Hdd
            || matches!(self.format_profile, FormatProfile::Pico | FormatProfile::Usb)
    }

    fn damping(&self) -> Damping {
        crate::trajectory::damping_for(
            self.device_type_tag == DeviceTypeTag::Hdd,
            matches!(self.format_profile, FormatProfile::Pico | FormatProfile::Usb),
        )
    }

    fn ballistic_ctx(&self) -> BallisticContext<'_> {
        BallisticContext {
            bitmap: &self.bitmap,
            quality: &self.quality,
            l2: &self.l2,
            flags: &self.flags,
            flux_start_blk: self.flux_start_blk,
            total_blocks: self.total_blocks,
            damping: self.damping(),
            is_hdd_like: self.is_hdd_like(),
            is_system_profile: self.format_profile == FormatProfile::System,
            read_only: self.read_only,
            is_snapshot: self.is_snapshot,
            strict_audit: self.strict_audit,
        }
    }

    fn route(&self, is_genesis: bool) -> GateDecision {
        saturation::evaluate(&self.flags, self.bitmap.used_blocks(), self.total_blocks, is_genesis)
    }

    fn horizon_alloc(&self) -> HnResult<u64> {
        self.horizon.alloc(&self.bitmap, &self.quality, &self.l2, &self.flags, self.strict_audit)
    }

    /// Places a single block for `(anchor, logical_index)` (`spec.md` §4.5).
    ///
    /// # Errors
    ///
    /// See [`ballistic::alloc_block`].
    pub fn alloc_block(&self, anchor: &Anchor, logical_index: u64) -> HnResult<(Placement, Status)> {
        let decision = self.route(false);
        let route = match decision {
            GateDecision::Ballistic => Route::Ballistic,
            GateDecision::Horizon => Route::HorizonOnly,
        };
        ballistic::alloc_block(&self.ballistic_ctx(), anchor, logical_index, route, || self.horizon_alloc())
    }

    /// Draws a fresh `(G, V)` seed for a new object (`spec.md` §4.6).
    ///
    /// # Errors
    ///
    /// See [`genesis::alloc_genesis`].
    pub fn alloc_genesis(
        &self,
        fractal_scale: u16,
        metadata_intent: bool,
        affinity: Affinity,
    ) -> HnResult<(Anchor, Status)> {
        let decision = self.route(true);
        let route = match decision {
            GateDecision::Ballistic => Route::Ballistic,
            GateDecision::Horizon => Route::HorizonOnly,
        };
        let rng = HalRandom(self.hal.as_ref());
        let result = genesis::alloc_genesis(
            &rng,
            self.total_blocks,
            self.flux_start_blk,
            fractal_scale,
            metadata_intent,
            affinity,
            route,
            || self.horizon_alloc(),
        );
        if let Ok((anchor, Status::Ok)) = &result {
            self.last_alloc_g.store(anchor.gravity_center, Ordering::Relaxed);
        }
        result
    }

    /// Claims the next free Horizon ring slot directly (`spec.md` §4.7).
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied`/`TimeParadox` for a read-only/snapshot volume,
    /// or `EnoSpc` once the Horizon's bounded probe budget is exhausted.
    pub fn alloc_horizon(&self) -> HnResult<Placement> {
        if self.read_only {
            return Err(HnError::AccessDenied);
        }
        if self.is_snapshot {
            return Err(HnError::TimeParadox);
        }
        let lba = self.horizon_alloc()?;
        Ok(Placement { lba, shell: ballistic::HORIZON_SHELL })
    }

    /// Allocates a run of `slots` Cortex slots (`spec.md` §4.8).
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` for a read-only volume, or see
    /// [`crate::cortex::Cortex::alloc_run`].
    pub fn alloc_cortex_run(&self, slots: u64) -> HnResult<u64> {
        if self.read_only {
            return Err(HnError::AccessDenied);
        }
        self.cortex.alloc_run(slots, &self.l2)
    }

    /// Releases `block`. Repeated out-of-range frees increment a taint
    /// counter; crossing [`OOB_FREE_PANIC_THRESHOLD`] sets PANIC
    /// (`spec.md` §4.10).
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` for a read-only volume, or `Geometry` for an
    /// out-of-range block.
    pub fn free_block(&self, block: u64) -> HnResult<Status> {
        if self.read_only {
            return Err(HnError::AccessDenied);
        }
        if block >= self.total_blocks {
            let count = self.oob_free_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= OOB_FREE_PANIC_THRESHOLD {
                self.flags.lock().insert(VolumeFlags::PANIC);
                hn4fatal!("{count} out-of-range frees observed; volume entering PANIC");
            }
            return Err(HnError::Geometry);
        }
        match self.bitmap.bitmap_op(&self.quality, &self.l2, &self.flags, block, BitmapOp::Clear, false, self.strict_audit)? {
            (BitmapStatus::Ok, _) => Ok(Status::Ok),
            (BitmapStatus::Healed, _) => Ok(Status::Healed),
        }
    }

    /// Rolls back a speculative allocation via `FORCE_CLEAR`, never setting
    /// DIRTY (`spec.md` §9).
    ///
    /// # Errors
    ///
    /// Returns `Geometry` for an out-of-range block.
    pub fn rollback_speculative(&self, block: u64) -> HnResult<()> {
        self.bitmap
            .bitmap_op(&self.quality, &self.l2, &self.flags, block, BitmapOp::ForceClear, false, self.strict_audit)
            .map(|_| ())
    }

    /// Current volume state flags.
    #[must_use]
    pub fn flags(&self) -> VolumeFlags {
        *self.flags.lock()
    }

    /// Current used-block count.
    #[must_use]
    pub fn used_blocks(&self) -> u64 {
        self.bitmap.used_blocks()
    }

    /// Total blocks tracked by this volume.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Cumulative ECC heal telemetry counter.
    #[must_use]
    pub fn heal_count(&self) -> u64 {
        self.bitmap.heal_count()
    }

    /// Read-only access to the quality mask, for bad-block remap callers
    /// (`spec.md` §5: the allocator never writes this map itself).
    #[must_use]
    pub fn quality_mask(&self) -> &QualityMask {
        &self.quality
    }
}

fn overlaps(a: (u64, u64), b: (u64, u64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use hn4_hal::{Caps, Geometry, HwFlags};

    struct TestHal {
        seed: std::sync::atomic::AtomicU64,
    }
    impl HalDevice for TestHal {
        fn caps(&self) -> Caps {
            Caps { sector_size: 512, capacity: 0, hw_flags: HwFlags::empty() }
        }
        fn mem_alloc(&self, size: usize) -> Result<hn4_hal::AlignedBuf, hn4_hal::HalError> {
            hn4_hal::AlignedBuf::new(size, 128)
        }
        fn submit_io(&self, _req: hn4_hal::IoRequest, cb: hn4_hal::IoCompletion) -> Result<(), hn4_hal::HalError> {
            cb(Ok(()));
            Ok(())
        }
        fn sync_io(&self, _req: hn4_hal::IoRequest) -> Result<(), hn4_hal::HalError> {
            Ok(())
        }
        fn zns_append_sync(&self, _zone: u64, _data: &[u8]) -> Result<u64, hn4_hal::HalError> {
            Err(hn4_hal::HalError::Unsupported)
        }
        fn random_u64(&self) -> u64 {
            self.seed.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
        }
    }

    fn mount(total_blocks: u64) -> Volume {
        let geometry = Geometry {
            lba_flux_start: 100,
            lba_horizon_start: 50,
            journal_start: 100,
            lba_cortex_start: 10,
            lba_bitmap_start: 50,
            block_size: 4096,
            sector_size: 512,
            total_blocks,
        };
        let sb = Superblock {
            geometry,
            device_type_tag: DeviceTypeTag::Ssd,
            format_profile: FormatProfile::Default,
            uuid_low56: 0,
        };
        let hal: Arc<dyn HalDevice> = Arc::new(TestHal { seed: AtomicU64::new(7) });
        Volume::mount(hal, &sb, None, None, false, false).unwrap()
    }

    #[test]
    fn mounts_and_allocates() {
        let v = mount(100_000);
        let anchor = Anchor::new(5000, 1, 0);
        let (placement, status) = v.alloc_block(&anchor, 0).unwrap();
        assert_eq!(status, Status::Ok);
        assert!(placement.lba >= 100);
        assert_eq!(v.used_blocks(), 1);
    }

    #[test]
    fn free_then_realloc() {
        let v = mount(100_000);
        let anchor = Anchor::new(5000, 1, 0);
        let (placement, _) = v.alloc_block(&anchor, 0).unwrap();
        v.free_block(placement.lba).unwrap();
        assert_eq!(v.used_blocks(), 0);
    }

    #[test]
    fn oob_free_panics_after_threshold() {
        let v = mount(100_000);
        for _ in 0..OOB_FREE_PANIC_THRESHOLD {
            let _ = v.free_block(999_999);
        }
        assert!(v.flags().contains(VolumeFlags::PANIC));
    }

    #[test]
    fn rejects_overlapping_chronicle_geometry() {
        let geometry = Geometry {
            lba_flux_start: 100,
            lba_horizon_start: 50,
            journal_start: 100,
            lba_cortex_start: 10,
            lba_bitmap_start: 50,
            block_size: 4096,
            sector_size: 512,
            total_blocks: 100_000,
        };
        let sb = Superblock {
            geometry,
            device_type_tag: DeviceTypeTag::Ssd,
            format_profile: FormatProfile::Default,
            uuid_low56: 0,
        };
        let hal: Arc<dyn HalDevice> = Arc::new(TestHal { seed: AtomicU64::new(1) });
        let chronicle = ChronicleGeometry { start: 5000, len: 10 }; // inside ballistic region
        let err = Volume::mount(hal, &sb, Some(chronicle), None, false, false).err();
        assert_eq!(err, Some(HnError::BadSuperblock));
    }
}
