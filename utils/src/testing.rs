//! Test-environment knobs, read from the environment.

use std::time::Duration;

/// `DEADLINE_SCALE_FACTOR` stretches test deadlines on slow machines.
pub fn deadline_scale_factor() -> f64 {
    std::env::var("DEADLINE_SCALE_FACTOR")
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|factor| *factor >= 1.0)
        .unwrap_or(1.0)
}

/// Scale `base` by the configured deadline factor.
pub fn scaled_deadline(base: Duration) -> Duration {
    base.mul_f64(deadline_scale_factor())
}

/// `TEST_KEEP_TMPDIRS=1` disables temporary-directory cleanup so a failed
/// run's database can be inspected.
pub fn keep_tmpdirs() -> bool {
    std::env::var("TEST_KEEP_TMPDIRS")
        .map(|value| value == "1")
        .unwrap_or(false)
}
