//! Canary traffic-weight ramp arithmetic.
//!
//! Pure function of the deployment end time, the current time, and the
//! strategy's minute-based windows. The ramp has three phases: weight
//! climbs from 0 toward 50 (increase), holds at exactly 50 (test), then
//! climbs from 50 toward 100 (decrease). Past the total window the
//! calculator is not consulted; the engine promotes the deployment
//! instead.

use thiserror::Error;

use stageline_state::{CanaryStep, CanaryStrategy};

const MINUTE_MS: u64 = 60 * 1000;

/// Which window feeds the increase-phase denominator.
///
/// The inherited control law divides increase-phase elapsed time by the
/// *decrease* window's duration. Whether that asymmetry is intentional is
/// an open product question, so both laws are supported; `DecreaseWindow`
/// reproduces the inherited behavior and is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncreaseTimeBase {
    #[default]
    DecreaseWindow,
    IncreaseWindow,
}

/// A computed point on the canary ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPoint {
    /// Integer-truncated traffic weight for the new version.
    pub weight: u32,
    pub step: CanaryStep,
    /// Whole minutes elapsed since the deployment end time.
    pub minutes_elapsed: u32,
}

/// Errors from ramp evaluation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RampError {
    /// The window used as the active phase's time base has zero length,
    /// which would make the ramp division meaningless.
    #[error("zero-length {0} window in canary strategy")]
    ZeroWindow(&'static str),
}

/// Evaluate the ramp at `now_ms` for a deployment that finished
/// converging at `end_ms`.
///
/// Returns `Ok(None)` once the total window has elapsed — the caller is
/// expected to promote the deployment rather than keep ramping.
pub fn ramp_point(
    end_ms: u64,
    now_ms: u64,
    canary: &CanaryStrategy,
    base: IncreaseTimeBase,
) -> Result<Option<RampPoint>, RampError> {
    let increase_ms = u64::from(canary.increase_minutes) * MINUTE_MS;
    let test_ms = u64::from(canary.test_minutes) * MINUTE_MS;
    let decrease_ms = u64::from(canary.decrease_minutes) * MINUTE_MS;
    let total_ms = increase_ms + test_ms + decrease_ms;

    if now_ms >= end_ms + total_ms {
        return Ok(None);
    }

    let elapsed = now_ms.saturating_sub(end_ms);
    let minutes_elapsed = (elapsed / MINUTE_MS) as u32;

    let (weight, step) = if elapsed < increase_ms {
        let denominator_ms = match base {
            IncreaseTimeBase::DecreaseWindow => decrease_ms,
            IncreaseTimeBase::IncreaseWindow => increase_ms,
        };
        if denominator_ms == 0 {
            return Err(RampError::ZeroWindow(match base {
                IncreaseTimeBase::DecreaseWindow => "decrease",
                IncreaseTimeBase::IncreaseWindow => "increase",
            }));
        }
        let weight = (50.0 * elapsed as f64 / denominator_ms as f64) as u32;
        (weight, CanaryStep::Increase)
    } else if elapsed < increase_ms + test_ms {
        (50, CanaryStep::Test)
    } else {
        // Unreachable with decrease_ms == 0: the total-window bound above
        // already returned None.
        if decrease_ms == 0 {
            return Err(RampError::ZeroWindow("decrease"));
        }
        let into_decrease = elapsed - increase_ms - test_ms;
        let weight = 50 + (50.0 * into_decrease as f64 / decrease_ms as f64) as u32;
        (weight, CanaryStep::Decrease)
    };

    Ok(Some(RampPoint {
        weight,
        step,
        minutes_elapsed,
    }))
}
