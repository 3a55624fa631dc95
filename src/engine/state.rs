use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::UserProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityPattern {
    Active,
    Passive,
    Idle,
}

impl Default for ActivityPattern {
    fn default() -> Self {
        ActivityPattern::Idle
    }
}

impl ActivityPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityPattern::Active => "active",
            ActivityPattern::Passive => "passive",
            ActivityPattern::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionTrigger {
    Manual,
    Auto,
}

/// The three independent timers behind auto-start detection.
///
/// Reset whenever a session starts or ends.
#[derive(Debug, Clone, Default)]
pub struct TriLayerState {
    /// Layer 1: when the current run of productive-app focus began.
    pub productive_start: Option<DateTime<Utc>>,
    /// Layer 2: the most recent distraction event. `None` counts as clean.
    pub last_distraction: Option<DateTime<Utc>>,
    /// Layer 3: when the current active-input streak began.
    pub active_streak_start: Option<DateTime<Utc>>,
}

impl TriLayerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What flagged content an active decay record is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecayTarget {
    App(String),
    Url(String),
}

impl DecayTarget {
    pub fn identifier(&self) -> &str {
        match self {
            DecayTarget::App(id) => id,
            DecayTarget::Url(id) => id,
        }
    }
}

/// Gradual resilience drain while the user stays on content they chose to
/// open despite an intervention.
#[derive(Debug, Clone)]
pub struct DistractionDecay {
    pub target: DecayTarget,
    pub started_at: DateTime<Utc>,
    pub last_check: DateTime<Utc>,
}

impl DistractionDecay {
    pub fn new(target: DecayTarget, now: DateTime<Utc>) -> Self {
        Self {
            target,
            started_at: now,
            last_check: now,
        }
    }
}

/// Session-scoped fatigue tracking derived from input activity.
#[derive(Debug, Clone, Default)]
pub struct FatigueState {
    pub baseline_apm: f64,
    pub degradation_count: u32,
    /// 0-100.
    pub score: f64,
}

impl FatigueState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// An intervention currently shown to the user, awaiting their choice.
#[derive(Debug, Clone)]
pub struct PendingIntervention {
    pub target: DecayTarget,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ActiveWindow {
    pub process: String,
    pub title: String,
}

/// The single process-wide mutable state. Every event handler serializes
/// through the engine's mutex around this struct.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub trigger: Option<SessionTrigger>,

    pub distraction_count: i64,
    /// Clamped to >= 0 after every mutation.
    pub resilience_score: i64,
    pub stamina_score: i64,
    /// 0-100.
    pub focus_score: f64,
    /// Simulated 0-100 energy; drains while running, recovers while idle.
    pub energy_level: f64,

    pub active_window: ActiveWindow,
    /// When the current window gained focus, for app-usage attribution.
    pub focused_since: Option<DateTime<Utc>>,
    pub focused_productive: bool,
    pub last_browser_url: String,
    pub current_apm: f64,
    pub activity_pattern: ActivityPattern,

    pub tri_layer: TriLayerState,
    pub decay: Option<DistractionDecay>,
    pub fatigue: FatigueState,
    pub pending_intervention: Option<PendingIntervention>,
    /// Watchdog penalties apply at most once per session.
    pub external_penalty_applied: bool,

    pub profile: UserProfile,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            session_id: None,
            started_at: None,
            trigger: None,
            distraction_count: 0,
            resilience_score: 0,
            stamina_score: 0,
            focus_score: 100.0,
            energy_level: 100.0,
            active_window: ActiveWindow::default(),
            focused_since: None,
            focused_productive: false,
            last_browser_url: String::new(),
            current_apm: 0.0,
            activity_pattern: ActivityPattern::Idle,
            tri_layer: TriLayerState::default(),
            decay: None,
            fatigue: FatigueState::default(),
            pending_intervention: None,
            external_penalty_applied: false,
            profile: UserProfile::default(),
        }
    }
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.session_id.is_some()
    }

    /// Reset everything session-scoped and mark the session running.
    pub fn begin_session(&mut self, session_id: String, trigger: SessionTrigger, now: DateTime<Utc>) {
        self.session_id = Some(session_id);
        self.started_at = Some(now);
        self.trigger = Some(trigger);
        self.distraction_count = 0;
        self.resilience_score = 0;
        self.stamina_score = 0;
        self.focus_score = 100.0;
        self.tri_layer.reset();
        self.decay = None;
        self.fatigue.reset();
        self.pending_intervention = None;
        self.external_penalty_applied = false;
    }

    /// Clear session-scoped state back to idle. Lifetime profile and the
    /// energy simulation survive.
    pub fn end_session(&mut self) {
        self.session_id = None;
        self.started_at = None;
        self.trigger = None;
        self.tri_layer.reset();
        self.decay = None;
        self.pending_intervention = None;
        self.external_penalty_applied = false;
    }

    pub fn session_duration_secs(&self, now: DateTime<Utc>) -> i64 {
        self.started_at
            .map(|start| (now - start).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// Add to the focus score, clamping to [0, 100].
    pub fn adjust_focus(&mut self, delta: f64) {
        self.focus_score = (self.focus_score + delta).clamp(0.0, 100.0);
    }

    /// Subtract from resilience, flooring at 0.
    pub fn penalize_resilience(&mut self, amount: i64) {
        self.resilience_score = (self.resilience_score - amount).max(0);
    }
}
