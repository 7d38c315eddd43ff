//! Shared fixtures for the HN4 allocator benchmarks.

use std::sync::Arc;

use hn4_hal::{DeviceTypeTag, FormatProfile, Geometry, HalDevice, HwFlags, Superblock};
use hn4_core::Volume;
use hn4_sim::SimHal;

/// Builds a volume over an in-memory [`SimHal`] with a conventional
/// geometry, sized for benchmark iteration counts.
///
/// # Panics
///
/// Panics if the fixture geometry fails to mount.
#[must_use]
pub fn bench_volume(total_blocks: u64) -> Volume {
    let geometry = Geometry {
        lba_flux_start: 1000,
        lba_horizon_start: 200,
        journal_start: 1000,
        lba_cortex_start: 10,
        lba_bitmap_start: 200,
        block_size: 4096,
        sector_size: 512,
        total_blocks,
    };
    let sb = Superblock { geometry, device_type_tag: DeviceTypeTag::Ssd, format_profile: FormatProfile::Default, uuid_low56: 0 };
    let hal: Arc<dyn HalDevice> = Arc::new(SimHal::new(total_blocks * 4096, 512, HwFlags::empty(), 1));
    Volume::mount(hal, &sb, None, None, false, false).expect("bench volume mounts")
}
