//! Cognitive fatigue detection from input-activity readings.

use super::state::{ActivityPattern, FatigueState};

/// APM readings below this never seed the baseline.
const BASELINE_MIN_APM: f64 = 10.0;
/// Degradation counts when APM drops under half the baseline.
const DEGRADATION_RATIO: f64 = 0.5;
/// Consecutive degradations before fatigue jumps.
const DEGRADATION_LIMIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatigueOutcome {
    None,
    SoftReset,
}

/// Advance the fatigue model with one reading.
///
/// `previous_pattern` is the pattern from the prior reading; fatigue only
/// climbs on *sustained* passive activity. Crossing the threshold resets
/// the score to 0 and asks for a soft reset.
pub fn update(
    fatigue: &mut FatigueState,
    current_apm: f64,
    pattern: ActivityPattern,
    previous_pattern: ActivityPattern,
    threshold: f64,
) -> FatigueOutcome {
    if fatigue.baseline_apm == 0.0 {
        if current_apm > BASELINE_MIN_APM {
            fatigue.baseline_apm = current_apm;
            return FatigueOutcome::None;
        }
    } else {
        let ratio = current_apm / fatigue.baseline_apm;
        if ratio < DEGRADATION_RATIO && current_apm > 0.0 {
            fatigue.degradation_count += 1;
        } else {
            fatigue.degradation_count = fatigue.degradation_count.saturating_sub(1);
        }
    }

    match (pattern, previous_pattern) {
        (ActivityPattern::Passive, ActivityPattern::Passive) => {
            fatigue.score = (fatigue.score + 2.0).min(100.0);
        }
        (ActivityPattern::Active, _) => {
            fatigue.score = (fatigue.score - 5.0).max(0.0);
        }
        _ => {}
    }

    if fatigue.degradation_count > DEGRADATION_LIMIT {
        fatigue.score = (fatigue.score + 10.0).min(100.0);
    }

    if fatigue.score > threshold {
        fatigue.score = 0.0;
        return FatigueOutcome::SoftReset;
    }

    FatigueOutcome::None
}
