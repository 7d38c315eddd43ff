//! Ballistic Allocator: per-block placement via the Trajectory Function,
//! probing orbital shells before falling through to the Horizon
//! (`spec.md` §4.5).

use crate::anchor::Anchor;
use crate::bitmap::{Bitmap, BitmapOp};
use crate::error::{BitmapStatus, HnError, HnResult, Placement, Status};
use crate::flags::VolumeFlags;
use crate::l2::L2Summary;
use crate::quality::{QualityMask, Tier};
use crate::sync::SpinLock;
use crate::trajectory::{self, Damping, INVALID};

/// Horizon's reserved sentinel shell index.
pub const HORIZON_SHELL: u32 = 15;

/// Upper probe bound for rotational/USB/pico media: `Theta` is suppressed,
/// so re-probing past shell 0 can never reach a new LBA.
const K_MAX_HDD_LIKE: u32 = 1;
/// Upper probe bound for SSD/NVM media.
const K_MAX_FLASH: u32 = 13;

/// Caller-visible gate state needed by the ballistic allocator; kept
/// separate from [`crate::saturation`] so this module does not need to
/// know about hysteresis, only the resulting routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run the normal ballistic probe.
    Ballistic,
    /// Skip straight to the Horizon at shell 15.
    HorizonOnly,
}

/// Parameters describing the volume needed to place a single block.
#[allow(clippy::struct_excessive_bools)]
pub struct BallisticContext<'a> {
    /// The volume's bitmap.
    pub bitmap: &'a Bitmap,
    /// The volume's quality mask.
    pub quality: &'a QualityMask,
    /// The volume's L2 summary.
    pub l2: &'a L2Summary,
    /// The volume's state flags.
    pub flags: &'a SpinLock<VolumeFlags>,
    /// First block of the ballistic region.
    pub flux_start_blk: u64,
    /// Total blocks tracked by the bitmap.
    pub total_blocks: u64,
    /// HDD Inertial Damping mode for this volume.
    pub damping: Damping,
    /// Whether the device behaves like an HDD for probe-budget purposes.
    pub is_hdd_like: bool,
    /// Whether the volume's format profile is `SYSTEM`.
    pub is_system_profile: bool,
    /// Whether the volume is mounted read-only.
    pub read_only: bool,
    /// Whether the volume is a time-offset snapshot.
    pub is_snapshot: bool,
    /// Whether `HN4_STRICT_AUDIT` double-free dirty-marking is enabled.
    pub strict_audit: bool,
}

/// Places a single block for `(anchor, logical_index)`, per `spec.md` §4.5.
///
/// `horizon_alloc` is called only when the ballistic phase is exhausted (or
/// skipped by the Saturation Gate) and a Horizon fallback is permitted by
/// policy; it is injected so this module does not depend on
/// [`crate::horizon`] directly.
///
/// # Errors
///
/// Returns `AccessDenied`/`TimeParadox` for a read-only/snapshot volume,
/// `Geometry` if the trajectory leaves the tracked address space,
/// `GravityCollapse` if a scaled orbit exhausts its shells, `EnoSpc` if a
/// `SYSTEM`-profile metadata allocation exhausts its shells, or whatever
/// `horizon_alloc` returns when the Horizon fallback is consulted.
pub fn alloc_block(
    ctx: &BallisticContext<'_>,
    anchor: &Anchor,
    logical_index: u64,
    route: Route,
    horizon_alloc: impl FnOnce() -> HnResult<u64>,
) -> HnResult<(Placement, Status)> {
    if ctx.read_only {
        return Err(HnError::AccessDenied);
    }
    if ctx.is_snapshot {
        return Err(HnError::TimeParadox);
    }

    if route == Route::HorizonOnly {
        let lba = horizon_alloc()?;
        return Ok((Placement { lba, shell: HORIZON_SHELL }, Status::Ok));
    }

    let k_max = if ctx.is_hdd_like { K_MAX_HDD_LIKE } else { K_MAX_FLASH };
    let v = anchor.orbit_vector_u64();

    for k in 0..k_max {
        let lba = trajectory::trajectory(
            anchor.gravity_center,
            v,
            logical_index,
            anchor.fractal_scale,
            k,
            ctx.flux_start_blk,
            ctx.total_blocks,
            ctx.damping,
        );
        if lba == INVALID {
            break;
        }
        if !ctx.quality.in_bounds(lba) {
            ctx.flags.lock().insert(VolumeFlags::PANIC);
            return Err(HnError::Geometry);
        }
        match ctx.quality.get(lba) {
            Tier::Toxic => continue,
            Tier::Bronze if anchor.is_metadata() => continue,
            Tier::Bronze | Tier::Silver | Tier::Gold => {}
        }

        match ctx.bitmap.bitmap_op(
            ctx.quality,
            ctx.l2,
            ctx.flags,
            lba,
            BitmapOp::Set,
            ctx.read_only,
            ctx.strict_audit,
        )? {
            (BitmapStatus::Ok, true) => return Ok((Placement { lba, shell: k }, Status::Ok)),
            (BitmapStatus::Healed, true) => return Ok((Placement { lba, shell: k }, Status::Healed)),
            (_, false) => {} // already used, try next shell
        }
    }

    // Ballistic phase exhausted.
    if anchor.fractal_scale > 0 {
        return Err(HnError::GravityCollapse);
    }
    if ctx.is_system_profile && anchor.is_metadata() {
        return Err(HnError::EnoSpc);
    }
    let lba = horizon_alloc()?;
    Ok((Placement { lba, shell: HORIZON_SHELL }, Status::Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Damping;

    fn ctx<'a>(
        bitmap: &'a Bitmap,
        quality: &'a QualityMask,
        l2: &'a L2Summary,
        flags: &'a SpinLock<VolumeFlags>,
        total_blocks: u64,
    ) -> BallisticContext<'a> {
        BallisticContext {
            bitmap,
            quality,
            l2,
            flags,
            flux_start_blk: 100,
            total_blocks,
            damping: Damping::Full,
            is_hdd_like: false,
            is_system_profile: false,
            read_only: false,
            is_snapshot: false,
            strict_audit: false,
        }
    }

    #[test]
    fn scenario_s2_collision_resolution() {
        let total = 100_000;
        let bitmap = Bitmap::new(total, 0);
        let quality = QualityMask::new(total);
        let l2 = L2Summary::new(total);
        let flags = SpinLock::new(VolumeFlags::default());
        let c = ctx(&bitmap, &quality, &l2, &flags, total);

        let anchor = Anchor::new(5000, 1, 0);
        let jammed = trajectory::trajectory(5000, 1, 0, 0, 0, 100, total, Damping::Full);
        bitmap.bitmap_op(&quality, &l2, &flags, jammed, BitmapOp::Set, false, false).unwrap();

        let (placement, status) =
            alloc_block(&c, &anchor, 0, Route::Ballistic, || Err(HnError::EnoSpc)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_ne!(placement.shell, 0);
        assert_ne!(placement.shell, HORIZON_SHELL);
        assert_ne!(placement.lba, jammed);
    }

    #[test]
    fn scenario_s3_gravity_collapse_to_horizon_m0() {
        let total = 100_000;
        let bitmap = Bitmap::new(total, 0);
        let quality = QualityMask::new(total);
        let l2 = L2Summary::new(total);
        let flags = SpinLock::new(VolumeFlags::default());
        let c = ctx(&bitmap, &quality, &l2, &flags, total);

        let anchor = Anchor::new(5000, 17, 0);
        for k in 0..13 {
            let lba = trajectory::trajectory(5000, 17, 0, 0, k, 100, total, Damping::Full);
            bitmap.bitmap_op(&quality, &l2, &flags, lba, BitmapOp::Set, false, false).unwrap();
        }

        let (placement, status) =
            alloc_block(&c, &anchor, 0, Route::Ballistic, || Ok(999_999)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(placement.shell, HORIZON_SHELL);
        assert_eq!(placement.lba, 999_999);
    }

    #[test]
    fn scenario_s4_gravity_collapse_scaled_m4() {
        let total = 100_000;
        let bitmap = Bitmap::new(total, 0);
        let quality = QualityMask::new(total);
        let l2 = L2Summary::new(total);
        let flags = SpinLock::new(VolumeFlags::default());
        let c = ctx(&bitmap, &quality, &l2, &flags, total);

        let anchor = Anchor::new(5000, 17, 4);
        for k in 0..13 {
            let lba = trajectory::trajectory(5000, 17, 0, 4, k, 100, total, Damping::Full);
            bitmap.bitmap_op(&quality, &l2, &flags, lba, BitmapOp::Set, false, false).unwrap();
        }

        let err = alloc_block(&c, &anchor, 0, Route::Ballistic, || Ok(999_999)).unwrap_err();
        assert_eq!(err, HnError::GravityCollapse);
    }
}
