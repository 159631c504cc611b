//! Work value and difficulty/multiplier arithmetic.

use lattica_crypto::blake2b_var;
use lattica_types::{Root, WorkThresholds};

/// The work value of a nonce: an 8-byte Blake2b over (work LE ‖ root),
/// read little-endian. Higher is harder.
pub fn value(root: &Root, work: u64) -> u64 {
    let mut input = [0u8; 40];
    input[..8].copy_from_slice(&work.to_le_bytes());
    input[8..].copy_from_slice(root.as_bytes());
    let digest = blake2b_var(8, &input);
    u64::from_le_bytes(digest.try_into().unwrap())
}

/// How many times harder `difficulty` is than `base`.
///
/// Expressed over the inverse gap to `u64::MAX`: halving the gap doubles the
/// multiplier. `difficulty == u64::MAX` maps to infinity.
pub fn to_multiplier(difficulty: u64, base: u64) -> f64 {
    (u64::MAX - base) as f64 / (u64::MAX - difficulty) as f64
}

/// Inverse of [`to_multiplier`]; saturates at zero and `u64::MAX`.
pub fn from_multiplier(multiplier: f64, base: u64) -> u64 {
    if multiplier <= 0.0 {
        return 0;
    }
    let gap = (u64::MAX - base) as f64 / multiplier;
    if gap >= u64::MAX as f64 {
        0
    } else {
        u64::MAX - gap as u64
    }
}

/// Rescale a multiplier measured against `threshold` onto the common
/// epoch-2-send basis, so multipliers are comparable across epochs and
/// subtypes when ordering elections.
pub fn normalized_multiplier(multiplier: f64, threshold: u64, work: &WorkThresholds) -> f64 {
    debug_assert!(multiplier >= 1.0);
    if threshold == work.epoch_1 || threshold == work.epoch_2_receive {
        let ratio = to_multiplier(work.epoch_2, threshold);
        debug_assert!(ratio >= 1.0);
        (multiplier + (ratio - 1.0)) / ratio
    } else {
        multiplier
    }
}

/// Inverse of [`normalized_multiplier`].
pub fn denormalized_multiplier(multiplier: f64, threshold: u64, work: &WorkThresholds) -> f64 {
    debug_assert!(multiplier >= 1.0);
    if threshold == work.epoch_1 || threshold == work.epoch_2_receive {
        let ratio = to_multiplier(work.epoch_2, threshold);
        multiplier * ratio + 1.0 - ratio
    } else {
        multiplier
    }
}
