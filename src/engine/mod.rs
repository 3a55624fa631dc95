//! The flow engine: tri-layer detection, session lifecycle, intervention
//! adjudication and scoring behind one serializing mutex.
//!
//! Every event source (window poller, input listener, browser bridge,
//! decay ticker) funnels through the handlers here; all shared state
//! lives in a single `Arc<Mutex<FlowState>>` so concurrent events cannot
//! race the single-active-session invariant.

pub mod detector;
pub mod fatigue;
pub mod intervention;
pub mod session;
pub mod state;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::Classifier;
use crate::config::ConfigStore;
use crate::db::{Database, FlowWindow, SessionRecord};
use crate::effects::{EffectBus, EffectCommand};

use detector::LayerThresholds;
use intervention::{BLOCKER_COUNTDOWN_SECS, BLOCKER_MESSAGE};
use session::{FlowStatus, XpBreakdown, PROFILE_BASELINE_SESSIONS, XP_RESUME_BONUS};
use state::{ActiveWindow, DecayTarget, FlowState, SessionTrigger};

const DECAY_TICK_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Ignored,
    Recorded,
    InterventionTriggered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { session_id: String },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped {
        duration_secs: i64,
        xp_earned: i64,
        xp_breakdown: XpBreakdown,
    },
    NotRunning,
}

struct TickerGuard {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FlowEngine {
    state: Arc<Mutex<FlowState>>,
    config: Arc<ConfigStore>,
    classifier: Arc<Classifier>,
    effects: EffectBus,
    db: Database,
    decay_ticker: StdMutex<Option<TickerGuard>>,
}

impl FlowEngine {
    pub async fn new(config: Arc<ConfigStore>, db: Database, effects: EffectBus) -> Self {
        let classifier = Arc::new(Classifier::new(&config.snapshot()));

        let mut state = FlowState::new();
        match db.load_profile().await {
            Ok(profile) => state.profile = profile,
            Err(err) => warn!("failed to load user profile: {err}; starting fresh"),
        }

        Self {
            state: Arc::new(Mutex::new(state)),
            config,
            classifier,
            effects,
            db,
            decay_ticker: StdMutex::new(None),
        }
    }

    // ── Boundary operations ──────────────────────────────────────────

    /// Invoked by the window poller on every focus change.
    pub async fn on_window_focus_changed(&self, app_name: &str, window_title: &str) {
        let now = Utc::now();
        let config = self.config.snapshot();
        let thresholds = LayerThresholds::from_config(&config);
        let outcome = self.classifier.classify_window(&config, app_name, window_title);

        let mut state = self.state.lock().await;

        // Attribute time on the outgoing window before switching.
        if state.is_running() {
            if let Some(since) = state.focused_since {
                let previous = state.active_window.clone();
                if !previous.process.is_empty() && previous.process != app_name {
                    self.log_app_usage(
                        previous.process,
                        (now - since).num_seconds().max(0),
                        state.focused_productive,
                        false,
                    );
                }
            }
        }
        state.active_window = ActiveWindow {
            process: app_name.to_string(),
            title: window_title.to_string(),
        };
        state.focused_since = Some(now);
        state.focused_productive = outcome.is_productive();

        if !state.is_running() {
            if outcome.is_productive() {
                detector::note_productive_focus(&mut state.tri_layer, now);
            } else {
                detector::clear_productive_focus(&mut state.tri_layer);
            }
            self.maybe_auto_start(&mut state, &thresholds, now);
            return;
        }

        if outcome.is_distracting() {
            let reason = match outcome.source {
                crate::classify::ClassificationSource::BlockedList => {
                    format!("Blocked application detected: {app_name}")
                }
                _ => format!("Distraction detected: {window_title}"),
            };
            self.trigger_intervention_locked(
                &mut state,
                DecayTarget::App(app_name.to_lowercase()),
                reason,
                now,
            );
        } else if intervention::release_decay_on_focus(&mut state, app_name, outcome.is_productive())
        {
            info!("Distraction decay released by focus change to {app_name}");
        }
    }

    /// Invoked by the input listener at most every couple of seconds.
    pub async fn on_input_activity(
        &self,
        apm: f64,
        keyboard_events: u32,
        _mouse_events: u32,
        scroll_events: u32,
    ) {
        let now = Utc::now();
        let config = self.config.snapshot();
        let thresholds = LayerThresholds::from_config(&config);
        let pattern = detector::derive_activity_pattern(apm, keyboard_events, scroll_events);

        let mut state = self.state.lock().await;
        let previous = state.activity_pattern;
        state.current_apm = apm;
        state.activity_pattern = pattern;

        if state.is_running() {
            let outcome = fatigue::update(
                &mut state.fatigue,
                apm,
                pattern,
                previous,
                config.fatigue_threshold,
            );
            if outcome == fatigue::FatigueOutcome::SoftReset {
                warn!("Fatigue threshold exceeded; triggering soft reset");
                self.effects.emit(EffectCommand::TriggerSoftReset {
                    duration_secs: config.soft_reset_seconds,
                });
            }
        } else {
            detector::note_input_pattern(&mut state.tri_layer, pattern, now);
            self.maybe_auto_start(&mut state, &thresholds, now);
        }
    }

    /// Invoked by the browser bridge per navigation.
    pub async fn on_browser_activity(
        &self,
        url: &str,
        _title: &str,
        _timestamp: f64,
    ) -> ActivityStatus {
        let now = Utc::now();
        let config = self.config.snapshot();

        let mut state = self.state.lock().await;
        if !state.is_running() {
            return ActivityStatus::Ignored;
        }
        state.last_browser_url = url.to_string();

        let outcome = self.classifier.classify_url(&config, url);
        if outcome.is_distracting() {
            let fragment = distracting_fragment(&config, url).unwrap_or_else(|| url.to_string());
            if self.trigger_intervention_locked(
                &mut state,
                DecayTarget::Url(fragment),
                format!("Distracting URL: {url}"),
                now,
            ) {
                return ActivityStatus::InterventionTriggered;
            }
            return ActivityStatus::Recorded;
        }

        if intervention::release_decay_on_navigation(&mut state, url) {
            info!("Distraction decay released by navigation to {url}");
        }
        ActivityStatus::Recorded
    }

    /// Invoked per search-box submission. Queries that survive the local
    /// keyword pass are deferred to the remote classifier; a result that
    /// lands after the session it was issued for has closed is discarded.
    pub async fn on_search_query(&self, query: &str, engine: &str, _timestamp: f64) -> ActivityStatus {
        let config = self.config.snapshot();
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            return ActivityStatus::Ignored;
        }

        let session_id = {
            let mut state = self.state.lock().await;
            if !state.is_running() {
                return ActivityStatus::Ignored;
            }

            let local = self.classifier.classify_url(&config, &normalized);
            if local.is_distracting() {
                let fragment =
                    distracting_fragment(&config, &normalized).unwrap_or_else(|| normalized.clone());
                let now = Utc::now();
                if self.trigger_intervention_locked(
                    &mut state,
                    DecayTarget::Url(fragment),
                    format!("Distracting query: {query}"),
                    now,
                ) {
                    return ActivityStatus::InterventionTriggered;
                }
                return ActivityStatus::Recorded;
            }

            state.session_id.clone()
        };

        let outcome = self.classifier.classify_query(&config, &normalized, engine).await;
        if !outcome.is_distracting() {
            return ActivityStatus::Recorded;
        }

        let mut state = self.state.lock().await;
        if state.session_id != session_id {
            info!("Discarding stale query classification for '{query}'");
            return ActivityStatus::Recorded;
        }
        let fragment = distracting_fragment(&config, &normalized).unwrap_or(normalized);
        if self.trigger_intervention_locked(
            &mut state,
            DecayTarget::Url(fragment),
            format!("Distracting query (AI): {query}"),
            Utc::now(),
        ) {
            ActivityStatus::InterventionTriggered
        } else {
            ActivityStatus::Recorded
        }
    }

    pub async fn start_session(&self) -> StartOutcome {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if state.is_running() {
            return StartOutcome::AlreadyRunning;
        }
        let session_id = self.begin_session_locked(&mut state, SessionTrigger::Manual, now);
        StartOutcome::Started { session_id }
    }

    pub async fn stop_session(&self) -> StopOutcome {
        let now = Utc::now();

        let (record, breakdown, flow_window, profile_snapshot, sessions_completed) = {
            let mut state = self.state.lock().await;
            let Some(session_id) = state.session_id.clone() else {
                return StopOutcome::NotRunning;
            };
            let started_at = state.started_at.unwrap_or(now);
            let duration_secs = state.session_duration_secs(now);

            let breakdown = session::compute_xp(
                duration_secs,
                state.resilience_score,
                state.stamina_score,
                state.focus_score,
                state.distraction_count,
            );
            let levels_gained = state.profile.add_xp(breakdown.total());
            state.profile.sessions_completed += 1;
            if levels_gained > 0 {
                info!("Level up! Now level {}", state.profile.level);
                if let Some(cognitive) = &mut state.profile.cognitive {
                    session::apply_level_ups(cognitive, levels_gained);
                }
            }

            let record = SessionRecord {
                id: session_id,
                started_at,
                ended_at: Some(now),
                duration_secs,
                focus_score: state.focus_score,
                fatigue_score: state.fatigue.score,
                apm_average: state.current_apm,
                distraction_count: state.distraction_count,
                resilience_score: state.resilience_score,
                stamina_score: state.stamina_score,
                xp_total: breakdown.total(),
                xp_breakdown: Some(breakdown.clone()),
            };
            let flow_window = FlowWindow {
                date: started_at.date_naive(),
                hour: started_at.hour(),
                flow_quality: (state.focus_score + (100.0 - state.fatigue.score)) / 2.0,
                apm_average: state.current_apm,
                duration_minutes: duration_secs / 60,
            };

            state.end_session();
            (
                record,
                breakdown,
                flow_window,
                state.profile.clone(),
                state.profile.sessions_completed,
            )
        };

        if let Some(guard) = self.decay_ticker.lock().unwrap().take() {
            guard.token.cancel();
            guard.handle.abort();
        }

        self.effects.emit(EffectCommand::RestoreNotifications);
        info!(
            "Flow session stopped after {}s; {} XP earned",
            record.duration_secs, record.xp_total
        );

        if let Err(err) = self.db.finalize_session(&record).await {
            warn!("failed to persist session close: {err}");
        }
        if let Err(err) = self.db.log_flow_window(&flow_window).await {
            warn!("failed to persist flow window: {err}");
        }

        if sessions_completed as usize == PROFILE_BASELINE_SESSIONS {
            self.compute_cognitive_baseline().await;
        } else if let Err(err) = self.db.save_profile(&profile_snapshot).await {
            warn!("failed to persist profile: {err}");
        }

        StopOutcome::Stopped {
            duration_secs: record.duration_secs,
            xp_earned: record.xp_total,
            xp_breakdown: breakdown,
        }
    }

    /// Read-only projection; the only side effect is the energy
    /// simulation update.
    pub async fn get_status(&self) -> FlowStatus {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        session::simulate_energy(&mut state, now);
        session::snapshot(&state, now)
    }

    /// Watchdog hook for forceful-termination penalties. Applied at most
    /// once per session, ignored while idle. Returns the resulting
    /// resilience score either way.
    pub async fn apply_external_penalty(&self, amount: i64, reason: &str) -> i64 {
        let mut state = self.state.lock().await;
        if !state.is_running() {
            info!("External penalty ignored; no active session");
            return state.resilience_score;
        }
        if state.external_penalty_applied {
            return state.resilience_score;
        }
        state.external_penalty_applied = true;
        state.penalize_resilience(amount.max(0));
        warn!("External penalty applied ({reason}): -{amount} resilience");
        state.resilience_score
    }

    /// Blocker callback: the user chose to wait for a break.
    pub async fn resolve_wait(&self) {
        let (target, profile_snapshot) = {
            let mut state = self.state.lock().await;
            let Some(target) = intervention::resolve_wait(&mut state) else {
                return;
            };
            let levels_gained = state.profile.add_xp(XP_RESUME_BONUS);
            if levels_gained > 0 {
                if let Some(cognitive) = &mut state.profile.cognitive {
                    session::apply_level_ups(cognitive, levels_gained);
                }
            }
            (target, state.profile.clone())
        };

        info!("User chose to wait (stamina boost)");
        self.effects.emit(EffectCommand::CloseAppOrTab {
            identifier: target.identifier().to_string(),
        });
        self.effects.emit(EffectCommand::HideBlocker);

        if let Err(err) = self.db.save_profile(&profile_snapshot).await {
            warn!("failed to persist resume bonus: {err}");
        }
    }

    /// Blocker callback: the user chose to open the content anyway.
    pub async fn resolve_proceed(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if intervention::resolve_proceed(&mut state, now).is_some() {
            info!("User chose to open anyway (resilience hit)");
            self.effects.emit(EffectCommand::HideBlocker);
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn maybe_auto_start(
        &self,
        state: &mut FlowState,
        thresholds: &LayerThresholds,
        now: DateTime<Utc>,
    ) {
        if state.is_running() {
            return;
        }
        if detector::all_layers_active(&state.tri_layer, thresholds, now) {
            info!("Tri-layer detection satisfied; auto-starting flow session");
            self.begin_session_locked(state, SessionTrigger::Auto, now);
        }
    }

    fn begin_session_locked(
        &self,
        state: &mut FlowState,
        trigger: SessionTrigger,
        now: DateTime<Utc>,
    ) -> String {
        let session_id = Uuid::new_v4().to_string();
        state.begin_session(session_id.clone(), trigger, now);

        self.effects.emit(EffectCommand::SuppressNotifications);

        let db = self.db.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = db.insert_session(&id, now).await {
                warn!("failed to persist session start: {err}");
            }
        });

        self.spawn_decay_ticker(session_id.clone());
        info!("Flow session started ({trigger:?})");
        session_id
    }

    fn spawn_decay_ticker(&self, session_id: String) {
        let token = CancellationToken::new();
        let child = token.clone();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(DECAY_TICK_SECS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick is immediate

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut guard = state.lock().await;
                        // A new session owns a new ticker; stale ones exit.
                        if guard.session_id.as_deref() != Some(session_id.as_str()) {
                            break;
                        }
                        let drained = intervention::apply_decay_tick(&mut guard, Utc::now());
                        if drained > 0 {
                            info!("Distraction decay: -{drained} resilience");
                        }
                    }
                    _ = child.cancelled() => break,
                }
            }
        });

        let mut slot = self.decay_ticker.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.token.cancel();
            previous.handle.abort();
        }
        *slot = Some(TickerGuard { token, handle });
    }

    fn trigger_intervention_locked(
        &self,
        state: &mut FlowState,
        target: DecayTarget,
        reason: String,
        now: DateTime<Utc>,
    ) -> bool {
        if !intervention::arm(state, target.clone(), reason.clone(), now) {
            info!("Intervention already active; ignoring trigger for {}", target.identifier());
            return false;
        }

        warn!("Intervention triggered: {reason}");
        self.effects.emit(EffectCommand::ShowBlocker {
            message: BLOCKER_MESSAGE.to_string(),
            app_name: target.identifier().to_string(),
            countdown_secs: BLOCKER_COUNTDOWN_SECS,
        });

        if let DecayTarget::App(app) = &target {
            self.log_app_usage(app.clone(), 0, false, true);
        }
        true
    }

    fn log_app_usage(&self, app_name: String, duration_secs: i64, is_productive: bool, broke_flow: bool) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(err) = db
                .log_app_usage(&app_name, duration_secs, is_productive, broke_flow)
                .await
            {
                warn!("failed to log app usage: {err}");
            }
        });
    }

    async fn compute_cognitive_baseline(&self) {
        match self.db.first_completed_sessions(PROFILE_BASELINE_SESSIONS).await {
            Ok(sessions) if sessions.len() == PROFILE_BASELINE_SESSIONS => {
                let baseline = session::baseline_profile(&sessions);
                info!("Cognitive profile baseline computed: {baseline:?}");
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.profile.cognitive = Some(baseline);
                    state.profile.clone()
                };
                if let Err(err) = self.db.save_profile(&snapshot).await {
                    warn!("failed to persist cognitive profile: {err}");
                }
            }
            Ok(sessions) => warn!(
                "expected {PROFILE_BASELINE_SESSIONS} completed sessions for baseline, found {}",
                sessions.len()
            ),
            Err(err) => warn!("failed to load sessions for baseline: {err}"),
        }
    }

    #[cfg(test)]
    pub(crate) fn state_handle(&self) -> Arc<Mutex<FlowState>> {
        self.state.clone()
    }
}

fn distracting_fragment(config: &crate::config::FlowConfig, text: &str) -> Option<String> {
    let haystack = text.to_lowercase();
    config
        .distracting_keywords
        .iter()
        .find(|keyword| haystack.contains(&keyword.to_lowercase()))
        .cloned()
}
