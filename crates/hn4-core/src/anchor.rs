//! The caller-held per-object seed that parameterizes the trajectory function.

/// Bit 0 of [`Anchor::data_class`]: set means the allocation is metadata,
/// clear means user-data. This is the encoding chosen for the Open Question
/// in `spec.md` §9 ("any single bit works so long as the allocator and
/// caller agree").
pub const DATA_CLASS_METADATA: u8 = 1 << 0;

/// Caller-held per-object seed `(G, V, M, class)` that parameterizes the
/// trajectory function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Gravity center: the anchor's base address within the ballistic window.
    pub gravity_center: u64,
    /// Orbit vector, stored as 6 bytes on disk but used as a `u64` stride.
    pub orbit_vector: [u8; 6],
    /// Fractal scale: `log2` of the allocation's stride in blocks.
    pub fractal_scale: u16,
    /// Intent flags; see [`DATA_CLASS_METADATA`].
    pub data_class: u8,
}

impl Anchor {
    /// Creates a new anchor for a user-data allocation.
    #[must_use]
    pub fn new(gravity_center: u64, orbit_vector: u64, fractal_scale: u16) -> Self {
        Self {
            gravity_center,
            orbit_vector: Self::pack_orbit_vector(orbit_vector),
            fractal_scale,
            data_class: 0,
        }
    }

    /// Creates a new anchor for a metadata allocation.
    #[must_use]
    pub fn new_metadata(gravity_center: u64, orbit_vector: u64, fractal_scale: u16) -> Self {
        Self {
            data_class: DATA_CLASS_METADATA,
            ..Self::new(gravity_center, orbit_vector, fractal_scale)
        }
    }

    /// Packs a `u64` orbit vector into its 6-byte on-disk representation.
    #[must_use]
    pub fn pack_orbit_vector(v: u64) -> [u8; 6] {
        let bytes = v.to_le_bytes();
        let mut packed = [0u8; 6];
        packed.copy_from_slice(&bytes[0..6]);
        packed
    }

    /// Returns the orbit vector `V` as a 48-bit-derived `u64`.
    #[must_use]
    pub fn orbit_vector_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[0..6].copy_from_slice(&self.orbit_vector);
        u64::from_le_bytes(bytes)
    }

    /// Whether this anchor's intent is metadata.
    #[must_use]
    pub fn is_metadata(&self) -> bool {
        self.data_class & DATA_CLASS_METADATA != 0
    }
}
