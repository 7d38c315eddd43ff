//! Genesis Allocator: draws a fresh `(G, V)` seed for a new object,
//! subject to coprimality with the available ballistic window
//! (`spec.md` §4.6).

use crate::anchor::Anchor;
use crate::ballistic::Route;
use crate::error::{HnError, HnResult, Status};
use crate::trajectory::{self, Damping};

/// Bounded retry budget for non-HDD/USB affinity draws.
const MAX_RETRIES_DEFAULT: u32 = 20;
/// Bounded retry budget for HDD/USB affinity draws (a larger budget since
/// the window is narrower and more likely to collide).
const MAX_RETRIES_HDD_USB: u32 = 128;

/// Where to draw the gravity center `G` from, per `spec.md` §4.6.1.
#[derive(Debug, Clone, Copy)]
pub enum Affinity {
    /// First 10% of available blocks.
    System,
    /// A topology-derived contiguous band: the caller's node out of
    /// `node_count` equal bands partitioning `[0, Phi)`.
    Ai {
        /// This caller's node/GPU index.
        node_index: u32,
        /// Total number of nodes/GPUs partitioning the window.
        node_count: u32,
    },
    /// A moving window centered on `last_alloc_g`, sized `window_len`
    /// stride-units, for sequential locality. Jitter wraps modulo the
    /// window rather than clamping to 0.
    Hdd {
        /// The volume's most recent genesis gravity center.
        last_alloc_g: u64,
        /// Width of the moving window, in stride units.
        window_len: u64,
    },
    /// Full `[0, Phi)`.
    Other,
}

impl Affinity {
    fn is_hdd_like(&self) -> bool {
        matches!(self, Affinity::Hdd { .. })
    }

    /// Computes the `[lo, hi)` window (in stride-units, i.e. `G/S` space)
    /// this affinity resolves to for a given `phi`.
    fn window(&self, phi: u64, jitter: u64) -> (u64, u64) {
        match *self {
            Affinity::System => (0, (phi / 10).max(1)),
            Affinity::Ai { node_index, node_count } => {
                let node_count = u64::from(node_count.max(1));
                let band = phi / node_count;
                let band = band.max(1);
                let lo = (u64::from(node_index) * band).min(phi.saturating_sub(1));
                (lo, (lo + band).min(phi))
            }
            Affinity::Hdd { last_alloc_g, window_len } => {
                let window_len = window_len.max(1).min(phi.max(1));
                let center = last_alloc_g % phi.max(1);
                let lo = center;
                let offset = jitter % window_len;
                let pos = (lo + offset) % phi.max(1);
                (pos, pos + 1) // effective single candidate per draw; see draw()
            }
            Affinity::Other => (0, phi),
        }
    }
}

/// Random-number source consumed by the Genesis Allocator; implemented by
/// the HAL in production, and by a seeded PRNG in tests.
pub trait RandomSource {
    /// Returns a fresh random 64-bit value.
    fn random_u64(&self) -> u64;
}

/// Draws `(G, V)` for a new object, or redirects to the Horizon if the
/// Saturation Gate's genesis threshold is tripped.
///
/// `horizon_alloc` reserves a Horizon slot and is only invoked when `route`
/// is [`Route::HorizonOnly`].
///
/// # Errors
///
/// Returns `EventHorizon` if `Phi` is zero, or whatever `horizon_alloc`
/// returns when `route` is [`Route::HorizonOnly`].
#[allow(clippy::too_many_arguments, reason = "mirrors spec.md's genesis draw signature")]
pub fn alloc_genesis(
    rng: &dyn RandomSource,
    total_blocks: u64,
    flux_start_blk: u64,
    fractal_scale: u16,
    metadata_intent: bool,
    affinity: Affinity,
    route: Route,
    horizon_alloc: impl FnOnce() -> HnResult<u64>,
) -> HnResult<(Anchor, Status)> {
    if route == Route::HorizonOnly {
        let lba = horizon_alloc()?;
        let anchor = Anchor { gravity_center: 0, orbit_vector: [0; 6], fractal_scale, data_class: 0 };
        return Ok((anchor, Status::HorizonFallback(lba)));
    }

    let stride = 1u64 << fractal_scale;
    let phi = trajectory::phi(total_blocks, flux_start_blk, stride);
    if phi == 0 {
        return Err(HnError::EventHorizon);
    }

    let max_retries = if affinity.is_hdd_like() { MAX_RETRIES_HDD_USB } else { MAX_RETRIES_DEFAULT };

    for _ in 0..max_retries {
        let jitter = rng.random_u64();
        let (lo, hi) = affinity.window(phi, jitter);
        let span = hi.saturating_sub(lo).max(1);
        let g_units = lo + (rng.random_u64() % span);
        let g = g_units * stride;

        let v_raw = 1 + (rng.random_u64() % phi.saturating_sub(1).max(1));
        if trajectory::coprime_fix(v_raw, phi) != v_raw {
            // Not coprime; re-draw rather than immediately substituting, to
            // give the orbit a chance at a non-degenerate V.
            continue;
        }

        if leaks_affinity_window(g, v_raw, phi, flux_start_blk, stride, &affinity) {
            continue;
        }

        let anchor = Anchor {
            gravity_center: g,
            orbit_vector: Anchor::pack_orbit_vector(v_raw),
            fractal_scale,
            data_class: u8::from(metadata_intent),
        };
        return Ok((anchor, Status::Ok));
    }

    // All retries exhausted without finding a coprime, in-window V:
    // substitute V=1 via coprime_fix rather than failing outright.
    let jitter = rng.random_u64();
    let (lo, hi) = affinity.window(phi, jitter);
    let span = hi.saturating_sub(lo).max(1);
    let g = (lo + (rng.random_u64() % span)) * stride;
    let v = trajectory::coprime_fix(1, phi);
    let anchor = Anchor {
        gravity_center: g,
        orbit_vector: Anchor::pack_orbit_vector(v),
        fractal_scale,
        data_class: u8::from(metadata_intent),
    };
    Ok((anchor, Status::Ok))
}

/// Verifies that the ballistic orbit of `(G, V)` stays within the affinity
/// window for a representative probe budget, rejecting candidates that
/// would leak allocations outside the intended locality band.
fn leaks_affinity_window(
    g: u64,
    v: u64,
    phi: u64,
    flux_start_blk: u64,
    stride: u64,
    affinity: &Affinity,
) -> bool {
    if matches!(affinity, Affinity::Other) {
        return false;
    }
    let (lo, hi) = affinity.window(phi, 0);
    let total_blocks = flux_start_blk + phi * stride;
    for n in 0..4u64 {
        let lba = trajectory::trajectory(g, v, n, 0, 0, flux_start_blk, total_blocks, Damping::Full);
        let offset = (lba.saturating_sub(flux_start_blk)) / stride.max(1);
        if offset < lo || offset >= hi {
            return true;
        }
    }
    false
}
