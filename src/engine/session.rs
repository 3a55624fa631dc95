//! Session scoring: XP breakdown at stop, level math, the cognitive
//! profile baseline and the status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{CognitiveProfile, SessionRecord};

use super::state::{ActivityPattern, FlowState};

pub const XP_PER_MINUTE: i64 = 5;
pub const XP_RESUME_BONUS: i64 = 10;
pub const XP_PER_LEVEL: i64 = 100;

/// Sessions averaged into the one-time cognitive profile baseline.
pub const PROFILE_BASELINE_SESSIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
    pub base: i64,
    pub resilience: i64,
    pub stamina: i64,
    pub focus: i64,
    pub penalty: i64,
}

impl XpBreakdown {
    pub fn total(&self) -> i64 {
        self.base + self.resilience + self.stamina + self.focus - self.penalty
    }
}

/// XP earned by a completed session.
///
/// The distraction penalty is intentionally zero: distractions already
/// cost resilience, and the breakdown keeps the term so the ledger stays
/// visible.
pub fn compute_xp(
    duration_secs: i64,
    resilience: i64,
    stamina: i64,
    focus: f64,
    distraction_count: i64,
) -> XpBreakdown {
    let minutes = duration_secs.max(0) / 60;
    XpBreakdown {
        base: minutes * XP_PER_MINUTE,
        resilience,
        stamina,
        focus: (focus.max(0.0) as i64) / 10,
        penalty: distraction_count * 0,
    }
}

pub fn level_for_xp(total_xp: i64) -> i64 {
    total_xp / XP_PER_LEVEL + 1
}

/// One-time baseline computed from the first three completed sessions,
/// each measure normalized to 0-100.
pub fn baseline_profile(sessions: &[SessionRecord]) -> CognitiveProfile {
    let count = sessions.len().max(1) as f64;
    let avg = |f: fn(&SessionRecord) -> f64| sessions.iter().map(f).sum::<f64>() / count;

    let avg_focus = avg(|s| s.focus_score);
    let avg_minutes = avg(|s| s.duration_secs as f64 / 60.0);
    let avg_resilience = avg(|s| s.resilience_score as f64);
    let avg_distractions = avg(|s| s.distraction_count as f64);

    CognitiveProfile {
        focus: avg_focus.clamp(0.0, 100.0),
        stamina: (avg_minutes / 60.0 * 100.0).clamp(0.0, 100.0),
        resilience: avg_resilience.clamp(0.0, 100.0),
        consistency: (100.0 - avg_distractions * 10.0).clamp(0.0, 100.0),
    }
}

/// Level-ups nudge the profile instead of recomputing it.
pub fn apply_level_ups(profile: &mut CognitiveProfile, levels_gained: i64) {
    for _ in 0..levels_gained {
        profile.focus = (profile.focus + 1.0).min(100.0);
        profile.stamina = (profile.stamina + 1.0).min(100.0);
        profile.resilience = (profile.resilience + 1.0).min(100.0);
        profile.consistency = (profile.consistency + 0.5).min(100.0);
    }
}

/// Energy drains 0.5%/minute while a session runs and recovers 1% per
/// status poll while idle.
pub fn simulate_energy(state: &mut FlowState, now: DateTime<Utc>) {
    if state.is_running() {
        let minutes = state.session_duration_secs(now) as f64 / 60.0;
        state.energy_level = (100.0 - minutes * 0.5).max(0.0);
    } else {
        state.energy_level = (state.energy_level + 1.0).min(100.0);
    }
}

/// Read-only projection served to the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatus {
    pub is_running: bool,
    pub energy: f64,
    pub focus_score: f64,
    pub current_task: String,
    pub session_duration: i64,
    pub resilience: i64,
    pub xp: i64,
    pub apm: f64,
    pub activity_pattern: ActivityPattern,
    pub fatigue_score: f64,
}

pub fn snapshot(state: &FlowState, now: DateTime<Utc>) -> FlowStatus {
    FlowStatus {
        is_running: state.is_running(),
        energy: state.energy_level,
        focus_score: state.focus_score,
        current_task: state.active_window.title.clone(),
        session_duration: state.session_duration_secs(now),
        resilience: state.resilience_score,
        xp: state.profile.total_xp,
        apm: state.current_apm,
        activity_pattern: state.activity_pattern,
        fatigue_score: state.fatigue.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Scenario E: 25 minutes, resilience 20, stamina 30, focus 85.
    #[test]
    fn xp_scenario() {
        let breakdown = compute_xp(1500, 20, 30, 85.0, 4);
        assert_eq!(breakdown.base, 125);
        assert_eq!(breakdown.resilience, 20);
        assert_eq!(breakdown.stamina, 30);
        assert_eq!(breakdown.focus, 8);
        assert_eq!(breakdown.penalty, 0);
        assert_eq!(breakdown.total(), 183);
    }

    #[test]
    fn partial_minutes_do_not_count() {
        assert_eq!(compute_xp(59, 0, 0, 0.0, 0).base, 0);
        assert_eq!(compute_xp(119, 0, 0, 0.0, 0).base, 5);
    }

    #[test]
    fn level_math() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(250), 3);
    }

    #[test]
    fn baseline_profile_normalizes() {
        let mk = |duration_secs, focus, resilience, distractions| SessionRecord {
            duration_secs,
            focus_score: focus,
            resilience_score: resilience,
            distraction_count: distractions,
            ..SessionRecord::sample()
        };
        let sessions = vec![
            mk(1800, 80.0, 10, 1),
            mk(3600, 90.0, 20, 2),
            mk(2700, 70.0, 30, 0),
        ];
        let profile = baseline_profile(&sessions);
        assert!((profile.focus - 80.0).abs() < 1e-9);
        assert!((profile.stamina - 75.0).abs() < 1e-9); // avg 45 min of a 60-min scale
        assert!((profile.resilience - 20.0).abs() < 1e-9);
        assert!((profile.consistency - 90.0).abs() < 1e-9);
    }

    #[test]
    fn level_ups_are_capped() {
        let mut profile = CognitiveProfile {
            focus: 99.5,
            stamina: 50.0,
            resilience: 100.0,
            consistency: 99.9,
        };
        apply_level_ups(&mut profile, 2);
        assert_eq!(profile.focus, 100.0);
        assert_eq!(profile.stamina, 52.0);
        assert_eq!(profile.resilience, 100.0);
        assert_eq!(profile.consistency, 100.0);
    }

    proptest! {
        // XP formula holds exactly for any valid inputs; the penalty term
        // stays zero no matter the distraction count.
        #[test]
        fn xp_formula_exact(
            duration in 0i64..500_000,
            resilience in 0i64..10_000,
            stamina in 0i64..10_000,
            focus in 0.0f64..100.0,
            distractions in 0i64..1_000,
        ) {
            let breakdown = compute_xp(duration, resilience, stamina, focus, distractions);
            prop_assert_eq!(breakdown.penalty, 0);
            prop_assert_eq!(
                breakdown.total(),
                (duration / 60) * 5 + resilience + stamina + (focus.max(0.0) as i64) / 10
            );
        }

        #[test]
        fn baseline_profile_stays_in_range(
            d1 in 0i64..50_000, d2 in 0i64..50_000, d3 in 0i64..50_000,
            f1 in 0.0f64..100.0, f2 in 0.0f64..100.0, f3 in 0.0f64..100.0,
            r in 0i64..500, c in 0i64..50,
        ) {
            let mk = |duration_secs, focus| SessionRecord {
                duration_secs,
                focus_score: focus,
                resilience_score: r,
                distraction_count: c,
                ..SessionRecord::sample()
            };
            let profile = baseline_profile(&[mk(d1, f1), mk(d2, f2), mk(d3, f3)]);
            for axis in [profile.focus, profile.stamina, profile.resilience, profile.consistency] {
                prop_assert!((0.0..=100.0).contains(&axis));
            }
        }
    }
}
