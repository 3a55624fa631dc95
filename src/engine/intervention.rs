//! Intervention adjudication and distraction decay.
//!
//! A detected distraction raises a modal blocker with a short mandatory
//! countdown before either choice unlocks. Waiting is rewarded; opening
//! anyway trades instant access for a per-minute resilience drain that
//! lasts as long as the user stays on the flagged content.

use chrono::{DateTime, Utc};

use super::state::{DecayTarget, DistractionDecay, FlowState, PendingIntervention};

pub const BLOCKER_COUNTDOWN_SECS: u32 = 3;
pub const BLOCKER_MESSAGE: &str = "Focus breach detected. You are building resilience.";

pub const WAIT_RESILIENCE_BONUS: i64 = 5;
pub const WAIT_STAMINA_BONUS: i64 = 10;
pub const WAIT_FOCUS_BONUS: f64 = 5.0;

pub const PROCEED_RESILIENCE_PENALTY: i64 = 10;
pub const PROCEED_FOCUS_PENALTY: f64 = 15.0;

/// Record the distraction and arm the blocker. Returns false when an
/// intervention is already showing (concurrent triggers are no-ops).
pub fn arm(state: &mut FlowState, target: DecayTarget, reason: String, now: DateTime<Utc>) -> bool {
    if state.pending_intervention.is_some() {
        return false;
    }
    state.distraction_count += 1;
    state.tri_layer.last_distraction = Some(now);
    state.pending_intervention = Some(PendingIntervention {
        target,
        reason,
        triggered_at: now,
    });
    true
}

/// The "wait for break" choice: reward scores and drop any active decay.
/// Returns the pending target so the engine can close the offending
/// app/tab.
pub fn resolve_wait(state: &mut FlowState) -> Option<DecayTarget> {
    let pending = state.pending_intervention.take()?;
    state.resilience_score += WAIT_RESILIENCE_BONUS;
    state.stamina_score += WAIT_STAMINA_BONUS;
    state.adjust_focus(WAIT_FOCUS_BONUS);
    state.decay = None;
    Some(pending.target)
}

/// The "open anyway" choice: immediate penalties plus a decay record for
/// the flagged content.
pub fn resolve_proceed(state: &mut FlowState, now: DateTime<Utc>) -> Option<DecayTarget> {
    let pending = state.pending_intervention.take()?;
    state.penalize_resilience(PROCEED_RESILIENCE_PENALTY);
    state.adjust_focus(-PROCEED_FOCUS_PENALTY);
    state.decay = Some(DistractionDecay::new(pending.target.clone(), now));
    Some(pending.target)
}

/// One decay tick: drain resilience by the whole minutes elapsed since
/// the last check and advance the checkpoint by exactly that much, so
/// fractional minutes carry over to the next tick.
pub fn apply_decay_tick(state: &mut FlowState, now: DateTime<Utc>) -> i64 {
    let Some(decay) = &mut state.decay else {
        return 0;
    };
    let minutes = (now - decay.last_check).num_minutes().max(0);
    if minutes == 0 {
        return 0;
    }
    decay.last_check += chrono::Duration::minutes(minutes);
    state.resilience_score = (state.resilience_score - minutes).max(0);
    minutes
}

/// Decay survives only while the flagged content stays in focus. App
/// targets are released when the focused process changes or turns
/// productive; URL targets (which no process name will ever match) are
/// released only by a productive switch.
pub fn release_decay_on_focus(state: &mut FlowState, focused_process: &str, productive: bool) -> bool {
    let Some(decay) = &state.decay else {
        return false;
    };
    let release = match &decay.target {
        DecayTarget::App(app) => productive || !app.eq_ignore_ascii_case(focused_process),
        DecayTarget::Url(_) => productive,
    };
    if release {
        state.decay = None;
    }
    release
}

/// A navigation away from a flagged URL also ends its decay.
pub fn release_decay_on_navigation(state: &mut FlowState, url: &str) -> bool {
    let Some(decay) = &state.decay else {
        return false;
    };
    let release = match &decay.target {
        DecayTarget::Url(flagged) => !url.contains(flagged.as_str()),
        DecayTarget::App(_) => false,
    };
    if release {
        state.decay = None;
    }
    release
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::SessionTrigger;
    use chrono::Duration;

    fn running_state(now: DateTime<Utc>) -> FlowState {
        let mut state = FlowState::new();
        state.begin_session("s1".into(), SessionTrigger::Manual, now);
        state
    }

    #[test]
    fn concurrent_trigger_is_noop() {
        let now = Utc::now();
        let mut state = running_state(now);
        assert!(arm(&mut state, DecayTarget::App("instagram.exe".into()), "r".into(), now));
        assert!(!arm(&mut state, DecayTarget::App("netflix.exe".into()), "r".into(), now));
        assert_eq!(state.distraction_count, 1);
    }

    #[test]
    fn wait_rewards_and_clears_decay() {
        let now = Utc::now();
        let mut state = running_state(now);
        state.decay = Some(DistractionDecay::new(DecayTarget::App("x.exe".into()), now));
        arm(&mut state, DecayTarget::App("instagram.exe".into()), "r".into(), now);

        let target = resolve_wait(&mut state).unwrap();
        assert_eq!(target.identifier(), "instagram.exe");
        assert_eq!(state.resilience_score, 5);
        assert_eq!(state.stamina_score, 10);
        assert_eq!(state.focus_score, 100.0); // capped
        assert!(state.decay.is_none());
        assert!(state.pending_intervention.is_none());
    }

    #[test]
    fn proceed_penalizes_and_starts_decay() {
        let now = Utc::now();
        let mut state = running_state(now);
        state.resilience_score = 4;
        arm(&mut state, DecayTarget::App("instagram.exe".into()), "r".into(), now);

        resolve_proceed(&mut state, now).unwrap();
        assert_eq!(state.resilience_score, 0); // floored, not -6
        assert_eq!(state.focus_score, 85.0);
        let decay = state.decay.as_ref().unwrap();
        assert_eq!(decay.target.identifier(), "instagram.exe");
        assert_eq!(decay.last_check, now);
    }

    #[test]
    fn choice_without_pending_intervention_is_noop() {
        let mut state = running_state(Utc::now());
        assert!(resolve_wait(&mut state).is_none());
        assert!(resolve_proceed(&mut state, Utc::now()).is_none());
        assert_eq!(state.resilience_score, 0);
    }

    // Scenario C: proceed on instagram, stay 3 minutes, then switch to a
    // productive window. Resilience loses the initial 10 plus exactly 3
    // from decay, and nothing after the switch.
    #[test]
    fn decay_scenario() {
        let start = Utc::now();
        let mut state = running_state(start);
        state.resilience_score = 20;
        arm(&mut state, DecayTarget::App("instagram.exe".into()), "r".into(), start);
        resolve_proceed(&mut state, start).unwrap();
        assert_eq!(state.resilience_score, 10);

        // Ticks at 1, 2 and 3 minutes drain one each.
        for minute in 1..=3 {
            let drained = apply_decay_tick(&mut state, start + Duration::minutes(minute));
            assert_eq!(drained, 1);
        }
        assert_eq!(state.resilience_score, 7);

        assert!(release_decay_on_focus(&mut state, "vscode.exe", true));
        assert_eq!(apply_decay_tick(&mut state, start + Duration::minutes(10)), 0);
        assert_eq!(state.resilience_score, 7);
    }

    #[test]
    fn missed_ticks_drain_cumulative_minutes() {
        let start = Utc::now();
        let mut state = running_state(start);
        state.resilience_score = 10;
        state.decay = Some(DistractionDecay::new(DecayTarget::App("a.exe".into()), start));

        // A single late tick after 3.5 minutes drains 3 and carries the
        // half minute forward.
        assert_eq!(apply_decay_tick(&mut state, start + Duration::seconds(210)), 3);
        assert_eq!(state.resilience_score, 7);
        assert_eq!(
            state.decay.as_ref().unwrap().last_check,
            start + Duration::minutes(3)
        );
    }

    #[test]
    fn url_decay_ignores_window_focus_unless_productive() {
        let now = Utc::now();
        let mut state = running_state(now);
        state.decay = Some(DistractionDecay::new(
            DecayTarget::Url("instagram.com".into()),
            now,
        ));
        assert!(!release_decay_on_focus(&mut state, "chrome.exe", false));
        assert!(state.decay.is_some());
        assert!(release_decay_on_focus(&mut state, "vscode.exe", true));
    }

    #[test]
    fn url_decay_released_by_navigation_away() {
        let now = Utc::now();
        let mut state = running_state(now);
        state.decay = Some(DistractionDecay::new(
            DecayTarget::Url("instagram.com".into()),
            now,
        ));
        assert!(!release_decay_on_navigation(&mut state, "https://instagram.com/reels"));
        assert!(release_decay_on_navigation(&mut state, "https://docs.rs/tokio"));
        assert!(state.decay.is_none());
    }
}
