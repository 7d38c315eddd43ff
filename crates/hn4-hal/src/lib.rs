//! Hardware Abstraction Layer contract consumed by the HN4 volume allocator.
//!
//! This crate defines the *seam* the allocator core talks through: device
//! capabilities, aligned memory allocation, synchronous/asynchronous I/O
//! submission, and a random-u64 source, plus the handful of geometry fields
//! the allocator reads from the Chronicle, Epoch Manager and Superblock.
//! Device drivers, chronicle append semantics and epoch rotation logic are
//! not implemented here — they are peripheral to the allocator's contract.

use std::alloc::{Layout, alloc, dealloc};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Minimum alignment `mem_alloc` must honor, per the allocator's requirement
/// to permit SIMD and cache-line operations on bitmap/L2/quality-mask arrays.
pub const MIN_ALIGNMENT: usize = 128;

bitflags::bitflags! {
    /// Hardware capability flags reported by a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HwFlags: u32 {
        /// Device has spinning media (seeks are expensive).
        const ROTATIONAL = 1 << 0;
        /// Device is non-volatile memory (byte-addressable class).
        const NVM        = 1 << 1;
        /// Device exposes zoned namespaces (append-only zones).
        const ZNS        = 1 << 2;
    }
}

/// Device type tag, as recorded in the Superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTypeTag {
    /// Rotational hard disk.
    Hdd,
    /// Solid-state drive.
    Ssd,
    /// Non-volatile memory device.
    Nvm,
    /// Zoned namespace device.
    Zns,
}

/// Format profile, as recorded in the Superblock. Drives affinity windows
/// and a handful of allocator policy decisions (HDD inertial damping,
/// SYSTEM metadata placement, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatProfile {
    /// Tiny embedded media (e.g. boot media).
    Pico,
    /// Removable USB-class media.
    Usb,
    /// General-purpose system volume.
    System,
    /// AI/ML working-set volume with topology-aware placement.
    Ai,
    /// No special-cased profile.
    Default,
}

/// Device capabilities reported by the HAL at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    /// Logical sector size in bytes.
    pub sector_size: u32,
    /// Device capacity in bytes.
    pub capacity: u64,
    /// Hardware capability flags.
    pub hw_flags: HwFlags,
}

/// Geometry fields the allocator reads from the Chronicle. The Chronicle's
/// append semantics are not modeled here; only the region it occupies is,
/// so the allocator can validate it does not overlap the ballistic/Horizon
/// regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChronicleGeometry {
    /// First block of the chronicle region.
    pub start: u64,
    /// Length of the chronicle region, in blocks.
    pub len: u64,
}

/// Geometry fields the allocator reads from the Epoch Manager. Epoch
/// rotation logic itself is not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochGeometry {
    /// First block of the epoch ring.
    pub start: u64,
    /// Length of the epoch ring, in blocks.
    pub len: u64,
    /// Number of superblock-like slots in the ring.
    pub slot_count: u32,
}

/// Volume geometry, as read from the persistent Superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// First block of the ballistic (trajectory-addressed) region.
    pub lba_flux_start: u64,
    /// First block of the Horizon fallback ring.
    pub lba_horizon_start: u64,
    /// First block past the Horizon ring (= journal start).
    pub journal_start: u64,
    /// First block of the Cortex slot-allocator region.
    pub lba_cortex_start: u64,
    /// First block of the bitmap array.
    pub lba_bitmap_start: u64,
    /// Block size in bytes.
    pub block_size: u32,
    /// Logical sector size in bytes.
    pub sector_size: u32,
    /// Total number of blocks tracked by the bitmap.
    pub total_blocks: u64,
}

impl Geometry {
    /// Size, in blocks, of the Horizon ring `[lba_horizon_start, journal_start)`.
    #[must_use]
    pub fn horizon_cap(&self) -> u64 {
        self.journal_start.saturating_sub(self.lba_horizon_start)
    }

    /// Size, in blocks, of the ballistic region `[lba_flux_start, total_blocks)`.
    #[must_use]
    pub fn ballistic_len(&self) -> u64 {
        self.total_blocks.saturating_sub(self.lba_flux_start)
    }
}

/// Persistent Superblock description: geometry, device tag, format profile
/// and feature flags. Parsing/writing the on-disk Superblock format is a
/// Non-goal; this struct is the in-memory view the allocator is handed at
/// mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Volume geometry.
    pub geometry: Geometry,
    /// Device type tag.
    pub device_type_tag: DeviceTypeTag,
    /// Format profile.
    pub format_profile: FormatProfile,
    /// Low 56 bits of the volume UUID, used to XOR-mask stored version
    /// counters (see Armored Word version muxing).
    pub uuid_low56: u64,
}

/// Errors a `HalDevice` implementation can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The requested allocation size/alignment could not be satisfied.
    AllocationFailed,
    /// The I/O request could not be submitted or completed.
    IoFailed,
    /// The operation is not supported by this device.
    Unsupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => write!(f, "aligned allocation failed"),
            Self::IoFailed => write!(f, "I/O request failed"),
            Self::Unsupported => write!(f, "operation not supported by device"),
        }
    }
}

impl std::error::Error for HalError {}

/// A byte buffer guaranteed to be aligned to at least [`MIN_ALIGNMENT`]
/// bytes, as returned by [`HalDevice::mem_alloc`].
pub struct AlignedBuf {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

// SAFETY: `AlignedBuf` owns its allocation exclusively; no aliasing occurs.
unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `len` bytes aligned to `align` (which
    /// must be at least [`MIN_ALIGNMENT`] and a power of two).
    ///
    /// # Errors
    ///
    /// Returns [`HalError::AllocationFailed`] if `align` is not a power of
    /// two or the allocator cannot satisfy the request.
    pub fn new(len: usize, align: usize) -> Result<Self, HalError> {
        let align = align.max(MIN_ALIGNMENT);
        let layout = Layout::from_size_align(len.max(1), align).map_err(|_| HalError::AllocationFailed)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(HalError::AllocationFailed);
        }
        // SAFETY: ptr is valid for len bytes, freshly allocated.
        unsafe { ptr.write_bytes(0, len) };
        Ok(Self { ptr, len, layout })
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: ptr/layout match the allocation made in `new`.
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// A single-block I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    /// Target logical block address.
    pub lba: u64,
    /// Number of contiguous blocks.
    pub block_count: u32,
    /// Whether this is a write (`true`) or a read (`false`).
    pub is_write: bool,
}

/// Completion callback for an asynchronously submitted I/O request.
pub type IoCompletion = Box<dyn FnOnce(Result<(), HalError>) + Send>;

/// The Hardware Abstraction Layer contract the allocator core consumes.
///
/// Implementations are device drivers (out of scope here, Non-goal) or test
/// fixtures (see the `hn4-sim` crate).
pub trait HalDevice: Send + Sync {
    /// Returns the device's capabilities.
    fn caps(&self) -> Caps;

    /// Allocates an aligned buffer of at least `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::AllocationFailed`] if the allocation cannot be
    /// satisfied.
    fn mem_alloc(&self, size: usize) -> Result<AlignedBuf, HalError>;

    /// Submits an asynchronous I/O request, invoking `cb` on completion.
    ///
    /// # Errors
    ///
    /// Returns a [`HalError`] if the request could not be submitted.
    fn submit_io(&self, req: IoRequest, cb: IoCompletion) -> Result<(), HalError>;

    /// Performs a synchronous I/O request.
    ///
    /// # Errors
    ///
    /// Returns a [`HalError`] if the request failed.
    fn sync_io(&self, req: IoRequest) -> Result<(), HalError>;

    /// Appends `data` to zone `zone`, returning the LBA it was written at.
    /// Emulates zone-append semantics on devices that are not natively ZNS.
    ///
    /// # Errors
    ///
    /// Returns a [`HalError`] if the zone is full or the device rejects the
    /// append.
    fn zns_append_sync(&self, zone: u64, data: &[u8]) -> Result<u64, HalError>;

    /// Returns a random 64-bit value from the device's entropy source.
    fn random_u64(&self) -> u64;
}
