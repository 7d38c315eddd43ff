//! Volume-wide state flags.

bitflags::bitflags! {
    /// Volume state flags, stored as a `u32` bit-set per `spec.md` §3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeFlags: u32 {
        /// No outstanding writeback since last sync; the inverse of DIRTY.
        const CLEAN              = 1 << 0;
        /// A logical mutation has occurred since the last checkpoint.
        const DIRTY              = 1 << 1;
        /// An uncorrectable ECC error or OOB quality-mask access occurred;
        /// further ballistic allocation and ECC writeback are disabled.
        const PANIC               = 1 << 2;
        /// Sticky: set when usage crosses the genesis saturation threshold,
        /// cleared only when usage falls below the recovery threshold.
        const RUNTIME_SATURATED   = 1 << 3;
    }
}

impl Default for VolumeFlags {
    fn default() -> Self {
        VolumeFlags::CLEAN
    }
}
