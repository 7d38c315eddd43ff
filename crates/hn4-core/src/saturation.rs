//! Saturation Gate: hysteretic threshold tests on `used_blocks /
//! total_blocks`, per `spec.md` §4.9.

use crate::flags::VolumeFlags;
use crate::sync::SpinLock;

/// Above this usage fraction, new-file allocations redirect to the Horizon
/// and the `RUNTIME_SATURATED` sticky flag is set.
pub const GENESIS_THRESHOLD_NUM: u64 = 90;
/// Above this usage fraction, in-place updates also route to the Horizon.
pub const UPDATE_THRESHOLD_NUM: u64 = 95;
/// `RUNTIME_SATURATED` clears only once usage drops below this fraction.
pub const RECOVERY_THRESHOLD_NUM: u64 = 85;
/// Common denominator for the threshold fractions above.
pub const THRESHOLD_DENOM: u64 = 100;

/// What the Saturation Gate tells the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed with the normal ballistic/cortex path.
    Ballistic,
    /// Route straight to the Horizon.
    Horizon,
}

/// Evaluates and updates the `RUNTIME_SATURATED` sticky flag against
/// current usage, then returns the gate's decision for `is_genesis`.
///
/// Hysteresis is on the flag, not on individual calls: once tripped at the
/// genesis threshold, every subsequent genesis call routes to Horizon even
/// if usage momentarily dips, until usage drops below the recovery
/// threshold.
pub fn evaluate(
    flags: &SpinLock<VolumeFlags>,
    used_blocks: u64,
    total_blocks: u64,
    is_genesis: bool,
) -> GateDecision {
    if total_blocks == 0 {
        return GateDecision::Horizon;
    }

    let mut guard = flags.lock();
    let saturated = guard.contains(VolumeFlags::RUNTIME_SATURATED);

    // used_blocks * 100 >= total_blocks * threshold, without floating point.
    let at_or_above = |threshold_num: u64| used_blocks * THRESHOLD_DENOM >= total_blocks * threshold_num;

    let above_genesis = at_or_above(GENESIS_THRESHOLD_NUM);
    let below_recovery = !at_or_above(RECOVERY_THRESHOLD_NUM);

    let new_saturated = if saturated { !below_recovery } else { above_genesis };
    if new_saturated != saturated {
        if new_saturated {
            guard.insert(VolumeFlags::RUNTIME_SATURATED);
        } else {
            guard.remove(VolumeFlags::RUNTIME_SATURATED);
        }
    }
    drop(guard);

    if is_genesis {
        if new_saturated { GateDecision::Horizon } else { GateDecision::Ballistic }
    } else if at_or_above(UPDATE_THRESHOLD_NUM) {
        GateDecision::Horizon
    } else {
        GateDecision::Ballistic
    }
}
