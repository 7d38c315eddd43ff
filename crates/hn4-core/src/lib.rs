//! Hydra-Nexus 4 (HN4) volume allocator core.
//!
//! Chooses the physical block address at which each logical write is
//! placed: a bijective modular-arithmetic trajectory function over an
//! error-correcting, concurrently-mutated bitmap, backed by a two-level
//! acceleration structure, a saturation policy, and a linear fallback ring.
//! See [`volume::Volume`] for the mounted-volume entry point.

pub mod anchor;
pub mod armored_word;
pub mod ballistic;
pub mod bitmap;
pub mod cortex;
pub mod ecc;
pub mod error;
pub mod flags;
pub mod genesis;
pub mod horizon;
pub mod l2;
pub mod log;
pub mod quality;
pub mod saturation;
pub mod sync;
pub mod trajectory;
pub mod volume;

pub use anchor::Anchor;
pub use error::{HnError, HnResult, Placement, Status};
pub use volume::Volume;
