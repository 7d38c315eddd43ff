//! Status and error types for the allocator's external contract.
//!
//! Positive status codes (`HEALED`, `HorizonFallback`) carry additional
//! information; negative codes are failures. Rather than overload a signed
//! integer, the two live as a `Result<Status, HnError>` (or, for the bitmap
//! operator, `Result<(BitmapStatus, bool), HnError>`), matching
//! `hadron-core`'s own `PmmError`/`VmmError` convention: a hand-written enum
//! with a manual `Display` impl, not `thiserror`.

use std::fmt;

/// A positive, informational allocation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed with no noteworthy side effect.
    Ok,
    /// A single-bit ECC error was detected and healed in the same call.
    Healed,
    /// A Genesis allocation was redirected to the Horizon because the
    /// Saturation Gate's genesis threshold is tripped. Carries the Horizon
    /// LBA that was reserved on the caller's behalf.
    HorizonFallback(u64),
}

/// Outcome of a single `_bitmap_op` call: the op-level status plus whether
/// the bit's logical value actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapStatus {
    /// Completed; `changed` says whether the bit's value flipped.
    Ok,
    /// A single-bit ECC error was healed while servicing this op.
    Healed,
}

/// All failure modes the allocator's public operations can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnError {
    /// Block index or quality-mask index out of bounds, or degenerate
    /// trajectory geometry (`Phi == 0`). Does not imply media corruption.
    Geometry,
    /// A double-bit ECC error was detected; uncorrectable. Sets PANIC.
    BitmapCorrupt,
    /// The volume is mounted read-only.
    AccessDenied,
    /// The volume is a time-offset snapshot and cannot accept writes.
    TimeParadox,
    /// The candidate block's quality-mask tier forbids this allocation.
    MediaToxic,
    /// The ballistic orbit was exhausted for a scaled (`M > 0`) allocation;
    /// falling back to the Horizon would corrupt the caller's size
    /// expectation, since the Horizon only emits 4 KiB units.
    GravityCollapse,
    /// Geometry violates an alignment requirement (e.g. block size not a
    /// multiple of sector size).
    AlignmentFail,
    /// The Superblock failed validation.
    BadSuperblock,
    /// A caller-supplied argument was invalid.
    InvalidArgument,
    /// No space: the orbit, the Horizon, or the Cortex region is exhausted.
    EnoSpc,
    /// The trajectory's modulus `Phi` is zero: the ballistic window can't
    /// hold even one stride at the requested fractal scale.
    EventHorizon,
}

impl fmt::Display for HnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry => write!(f, "geometry violation or out-of-bounds access"),
            Self::BitmapCorrupt => write!(f, "uncorrectable bitmap ECC error"),
            Self::AccessDenied => write!(f, "volume is read-only"),
            Self::TimeParadox => write!(f, "volume is a time-offset snapshot"),
            Self::MediaToxic => write!(f, "candidate block's media quality forbids allocation"),
            Self::GravityCollapse => write!(f, "scaled allocation exhausted its orbit"),
            Self::AlignmentFail => write!(f, "geometry alignment requirement violated"),
            Self::BadSuperblock => write!(f, "superblock failed validation"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::EnoSpc => write!(f, "no space left"),
            Self::EventHorizon => write!(f, "trajectory modulus is zero"),
        }
    }
}

impl std::error::Error for HnError {}

/// Result type used throughout the allocator's public API.
pub type HnResult<T> = Result<T, HnError>;

/// Where a block-placement operation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// The physical block address chosen.
    pub lba: u64,
    /// The orbital shell (or `15` for the Horizon sentinel) that produced it.
    pub shell: u32,
}
