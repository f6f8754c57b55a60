//! Exponential cool-down growth for a re-opening breaker.

use std::time::Duration;

/// Cool-down after `reopens` consecutive failed probes.
///
/// `reopens == 0` is the first opening and yields `base`; each further
/// failed probe multiplies by `multiplier`, capped at `max`.
pub fn cooldown_for(reopens: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    if reopens == 0 || multiplier <= 1.0 {
        return base.min(max);
    }

    let factor = multiplier.powi(reopens.min(i32::MAX as u32) as i32);
    let grown = base.as_secs_f64() * factor;
    if !grown.is_finite() || grown >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(grown)
}
