//! An in-memory [`HalDevice`] fixture, for allocator tests and benchmarks
//! that need a HAL without a real block device underneath.
//!
//! Grounded on the deterministic-PRNG pattern used by `ShinyJonny-fsfill`'s
//! fill-verification harness: every `SimHal` is seeded explicitly, so a
//! failing test reproduces byte-for-byte from its seed.

use std::sync::Mutex;

use hn4_hal::{AlignedBuf, Caps, HalDevice, HalError, HwFlags, IoCompletion, IoRequest};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// An in-memory block device backing a [`HalDevice`] implementation.
pub struct SimHal {
    storage: Mutex<Vec<u8>>,
    zones: Mutex<Vec<Vec<u8>>>,
    rng: Mutex<ChaCha8Rng>,
    sector_size: u32,
    hw_flags: HwFlags,
}

impl SimHal {
    /// Creates a simulated device of `capacity` bytes, deterministic PRNG
    /// seeded with `seed`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "simulated capacities fit usize on 64-bit targets")]
    pub fn new(capacity: u64, sector_size: u32, hw_flags: HwFlags, seed: u64) -> Self {
        Self {
            storage: Mutex::new(vec![0u8; capacity as usize]),
            zones: Mutex::new(Vec::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            sector_size,
            hw_flags,
        }
    }

    #[allow(clippy::cast_possible_truncation, reason = "simulated LBAs fit usize on 64-bit targets")]
    fn byte_range(req: IoRequest, block_size: u32) -> (usize, usize) {
        let start = req.lba as usize * block_size as usize;
        let len = req.block_count as usize * block_size as usize;
        (start, start + len)
    }
}

/// Block size assumed for I/O requests against a [`SimHal`]; the HAL
/// contract does not carry block size itself (that lives in the volume's
/// `Geometry`), so the simulator fixes a conventional 4 KiB for its own
/// byte-addressed backing store.
pub const SIM_BLOCK_SIZE: u32 = 4096;

impl HalDevice for SimHal {
    fn caps(&self) -> Caps {
        Caps { sector_size: self.sector_size, capacity: self.storage.lock().unwrap().len() as u64, hw_flags: self.hw_flags }
    }

    fn mem_alloc(&self, size: usize) -> Result<AlignedBuf, HalError> {
        AlignedBuf::new(size, 128)
    }

    fn submit_io(&self, req: IoRequest, cb: IoCompletion) -> Result<(), HalError> {
        let result = self.sync_io(req);
        cb(result);
        Ok(())
    }

    fn sync_io(&self, req: IoRequest) -> Result<(), HalError> {
        let (start, end) = Self::byte_range(req, SIM_BLOCK_SIZE);
        let mut storage = self.storage.lock().unwrap();
        if end > storage.len() {
            return Err(HalError::IoFailed);
        }
        if req.is_write {
            for b in &mut storage[start..end] {
                *b = 0xA5; // distinguishable "written" marker
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, reason = "simulated zone indices fit usize on 64-bit targets")]
    fn zns_append_sync(&self, zone: u64, data: &[u8]) -> Result<u64, HalError> {
        let mut zones = self.zones.lock().unwrap();
        let zone = zone as usize;
        if zones.len() <= zone {
            zones.resize_with(zone + 1, Vec::new);
        }
        let offset = zones[zone].len() as u64;
        zones[zone].extend_from_slice(data);
        Ok(offset)
    }

    fn random_u64(&self) -> u64 {
        self.rng.lock().unwrap().next_u64()
    }
}
