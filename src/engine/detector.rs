//! Tri-layer auto-start detection.
//!
//! Three independent temporal signals must hold simultaneously before a
//! session auto-starts: sustained productive-app focus (Layer 1), a clean
//! distraction window (Layer 2) and a sustained active-input streak
//! (Layer 3). Everything here is a pure function of the layer state, the
//! thresholds and `now`, so the scenarios are testable with synthetic
//! clocks.

use chrono::{DateTime, Utc};

use crate::config::FlowConfig;

use super::state::{ActivityPattern, TriLayerState};

#[derive(Debug, Clone, Copy)]
pub struct LayerThresholds {
    /// Layers 1 and 2 share the flow threshold.
    pub productive_secs: i64,
    pub distraction_free_secs: i64,
    /// Layer 3 uses the input-streak window.
    pub input_streak_secs: i64,
}

impl LayerThresholds {
    pub fn from_config(config: &FlowConfig) -> Self {
        Self {
            productive_secs: config.flow_threshold_secs(),
            distraction_free_secs: config.flow_threshold_secs(),
            input_streak_secs: i64::from(config.auto_flow_active_seconds),
        }
    }
}

/// Layer 1: start the timer on productive focus, keep it if already
/// running.
pub fn note_productive_focus(tri: &mut TriLayerState, now: DateTime<Utc>) {
    if tri.productive_start.is_none() {
        tri.productive_start = Some(now);
    }
}

pub fn clear_productive_focus(tri: &mut TriLayerState) {
    tri.productive_start = None;
}

/// Layer 2: any distraction event restarts the clean window.
pub fn note_distraction(tri: &mut TriLayerState, now: DateTime<Utc>) {
    tri.last_distraction = Some(now);
}

/// Layer 3: an active pattern starts or extends the streak; anything else
/// breaks it.
pub fn note_input_pattern(tri: &mut TriLayerState, pattern: ActivityPattern, now: DateTime<Utc>) {
    match pattern {
        ActivityPattern::Active => {
            if tri.active_streak_start.is_none() {
                tri.active_streak_start = Some(now);
            }
        }
        ActivityPattern::Passive | ActivityPattern::Idle => {
            tri.active_streak_start = None;
        }
    }
}

pub fn layer1_active(tri: &TriLayerState, thresholds: &LayerThresholds, now: DateTime<Utc>) -> bool {
    tri.productive_start
        .map(|start| (now - start).num_seconds() >= thresholds.productive_secs)
        .unwrap_or(false)
}

pub fn layer2_active(tri: &TriLayerState, thresholds: &LayerThresholds, now: DateTime<Utc>) -> bool {
    match tri.last_distraction {
        None => true,
        Some(last) => (now - last).num_seconds() >= thresholds.distraction_free_secs,
    }
}

pub fn layer3_active(tri: &TriLayerState, thresholds: &LayerThresholds, now: DateTime<Utc>) -> bool {
    tri.active_streak_start
        .map(|start| (now - start).num_seconds() >= thresholds.input_streak_secs)
        .unwrap_or(false)
}

/// The auto-start gate: true only when all three layers hold at once.
/// Callers must additionally check that no session is running; the engine
/// does so under its state mutex, which is what makes the check
/// idempotent under concurrent events.
pub fn all_layers_active(
    tri: &TriLayerState,
    thresholds: &LayerThresholds,
    now: DateTime<Utc>,
) -> bool {
    layer1_active(tri, thresholds, now)
        && layer2_active(tri, thresholds, now)
        && layer3_active(tri, thresholds, now)
}

/// Activity-pattern derivation from a single input reading.
pub fn derive_activity_pattern(apm: f64, keyboard_events: u32, scroll_events: u32) -> ActivityPattern {
    if keyboard_events > 30 {
        return ActivityPattern::Active;
    }
    if keyboard_events < 10 && scroll_events > 20 {
        return ActivityPattern::Passive;
    }
    if apm > 10.0 {
        return ActivityPattern::Active;
    }
    ActivityPattern::Idle
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn thresholds() -> LayerThresholds {
        LayerThresholds {
            productive_secs: 600,
            distraction_free_secs: 600,
            input_streak_secs: 240,
        }
    }

    fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(secs)
    }

    #[test]
    fn productive_focus_does_not_reset_running_timer() {
        let base = Utc::now();
        let mut tri = TriLayerState::default();
        note_productive_focus(&mut tri, base);
        note_productive_focus(&mut tri, at(base, 300));
        assert_eq!(tri.productive_start, Some(base));
    }

    #[test]
    fn clean_distraction_window_counts_as_active() {
        let tri = TriLayerState::default();
        assert!(layer2_active(&tri, &thresholds(), Utc::now()));
    }

    #[test]
    fn recent_distraction_blocks_layer2() {
        let base = Utc::now();
        let mut tri = TriLayerState::default();
        note_distraction(&mut tri, base);
        assert!(!layer2_active(&tri, &thresholds(), at(base, 599)));
        assert!(layer2_active(&tri, &thresholds(), at(base, 600)));
    }

    // Scenario A: focus alternates between a productive and a neutral
    // window every 30s for 11 minutes. Layer 1 keeps resetting and the
    // gate never opens.
    #[test]
    fn alternating_focus_never_reaches_threshold() {
        let base = Utc::now();
        let thresholds = thresholds();
        let mut tri = TriLayerState::default();
        // Layers 2 and 3 would otherwise be satisfied the whole time.
        tri.active_streak_start = Some(at(base, -600));

        let mut fired = false;
        for step in 0..22 {
            let now = at(base, step * 30);
            if step % 2 == 0 {
                note_productive_focus(&mut tri, now);
            } else {
                clear_productive_focus(&mut tri);
            }
            fired |= all_layers_active(&tri, &thresholds, now);
        }
        assert!(!fired);
    }

    // Scenario B: continuous productive focus, clean distraction window
    // and a continuous active streak. The gate opens at the 10-minute
    // mark and not before.
    #[test]
    fn sustained_layers_fire_at_threshold() {
        let base = Utc::now();
        let thresholds = thresholds();
        let mut tri = TriLayerState::default();
        note_productive_focus(&mut tri, base);
        note_input_pattern(&mut tri, ActivityPattern::Active, base);

        assert!(!all_layers_active(&tri, &thresholds, at(base, 599)));
        assert!(all_layers_active(&tri, &thresholds, at(base, 600)));
        assert!(all_layers_active(&tri, &thresholds, at(base, 660)));
    }

    #[test]
    fn passive_pattern_breaks_streak() {
        let base = Utc::now();
        let mut tri = TriLayerState::default();
        note_input_pattern(&mut tri, ActivityPattern::Active, base);
        note_input_pattern(&mut tri, ActivityPattern::Passive, at(base, 60));
        assert!(tri.active_streak_start.is_none());
    }

    #[test]
    fn single_false_layer_blocks_the_gate() {
        let base = Utc::now();
        let thresholds = thresholds();
        let mut tri = TriLayerState::default();
        note_productive_focus(&mut tri, at(base, -700));
        note_input_pattern(&mut tri, ActivityPattern::Active, at(base, -700));
        note_distraction(&mut tri, at(base, -10));
        assert!(!all_layers_active(&tri, &thresholds, base));
    }

    #[test]
    fn pattern_derivation_thresholds() {
        assert_eq!(derive_activity_pattern(120.0, 45, 0), ActivityPattern::Active);
        assert_eq!(derive_activity_pattern(40.0, 5, 30), ActivityPattern::Passive);
        assert_eq!(derive_activity_pattern(15.0, 12, 0), ActivityPattern::Active);
        assert_eq!(derive_activity_pattern(2.0, 1, 1), ActivityPattern::Idle);
    }
}
