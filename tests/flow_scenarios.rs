use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use flow_engine::{
    db::SessionRecord,
    engine::{state::ActivityPattern, ActivityStatus, StartOutcome, StopOutcome},
    ConfigStore, Database, EffectBus, EffectCommand, FlowEngine, PatternAnalyzer,
};

async fn build_engine(
    dir: &tempfile::TempDir,
) -> (Arc<FlowEngine>, UnboundedReceiver<EffectCommand>) {
    let config = Arc::new(ConfigStore::load(dir.path().join("flow_config.json")));
    let db = Database::new(dir.path().join("flow_patterns.db")).unwrap();
    let (bus, rx) = EffectBus::new();
    (Arc::new(FlowEngine::new(config, db, bus).await), rx)
}

#[tokio::test]
async fn full_intervention_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, mut effects) = build_engine(&dir).await;

    let started = engine.start_session().await;
    assert!(matches!(started, StartOutcome::Started { .. }));
    assert_eq!(effects.recv().await, Some(EffectCommand::SuppressNotifications));

    // A distracting navigation raises the blocker.
    let status = engine
        .on_browser_activity("https://twitter.com/home", "Twitter", 0.0)
        .await;
    assert_eq!(status, ActivityStatus::InterventionTriggered);
    assert!(matches!(
        effects.recv().await,
        Some(EffectCommand::ShowBlocker { .. })
    ));

    // Opening anyway costs resilience and focus immediately.
    engine.resolve_proceed().await;
    assert_eq!(effects.recv().await, Some(EffectCommand::HideBlocker));

    let snapshot = engine.get_status().await;
    assert!(snapshot.is_running);
    assert_eq!(snapshot.resilience, 0);
    assert_eq!(snapshot.focus_score, 85.0);

    // Switching to productive work ends the decay; the session closes
    // cleanly afterwards.
    engine
        .on_window_focus_changed("vscode.exe", "main.rs - Visual Studio Code")
        .await;

    let stopped = engine.stop_session().await;
    match stopped {
        StopOutcome::Stopped { xp_breakdown, .. } => {
            assert_eq!(xp_breakdown.penalty, 0);
            assert_eq!(xp_breakdown.focus, 8);
        }
        StopOutcome::NotRunning => panic!("expected Stopped"),
    }
    assert_eq!(effects.recv().await, Some(EffectCommand::RestoreNotifications));

    assert_eq!(engine.stop_session().await, StopOutcome::NotRunning);
}

#[tokio::test]
async fn wait_choice_grants_resume_bonus_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, mut effects) = build_engine(&dir).await;

    engine.start_session().await;
    engine
        .on_window_focus_changed("chrome.exe", "Instagram - Google Chrome")
        .await;
    engine.resolve_wait().await;

    // Lifetime XP reflects the bonus before the session ends.
    let snapshot = engine.get_status().await;
    assert_eq!(snapshot.xp, 10);
    assert_eq!(snapshot.resilience, 5);

    // SuppressNotifications, ShowBlocker, CloseAppOrTab, HideBlocker.
    assert_eq!(effects.recv().await, Some(EffectCommand::SuppressNotifications));
    assert!(matches!(
        effects.recv().await,
        Some(EffectCommand::ShowBlocker { .. })
    ));
    assert!(matches!(
        effects.recv().await,
        Some(EffectCommand::CloseAppOrTab { .. })
    ));
    assert_eq!(effects.recv().await, Some(EffectCommand::HideBlocker));

    match engine.stop_session().await {
        StopOutcome::Stopped { xp_breakdown, .. } => {
            assert_eq!(xp_breakdown.resilience, 5);
            assert_eq!(xp_breakdown.stamina, 10);
            assert_eq!(xp_breakdown.focus, 10); // capped at 100
        }
        StopOutcome::NotRunning => panic!("expected Stopped"),
    }
}

#[tokio::test]
async fn status_reflects_input_activity() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _effects) = build_engine(&dir).await;

    engine.on_input_activity(120.0, 45, 3, 0).await;
    let snapshot = engine.get_status().await;
    assert_eq!(snapshot.apm, 120.0);
    assert_eq!(snapshot.activity_pattern, ActivityPattern::Active);

    engine.on_input_activity(30.0, 4, 0, 25).await;
    let snapshot = engine.get_status().await;
    assert_eq!(snapshot.activity_pattern, ActivityPattern::Passive);
}

#[tokio::test]
async fn search_queries_route_through_keyword_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _effects) = build_engine(&dir).await;

    engine.start_session().await;
    assert_eq!(
        engine.on_search_query("  ", "google", 0.0).await,
        ActivityStatus::Ignored
    );
    assert_eq!(
        engine
            .on_search_query("best tiktok compilations", "google", 0.0)
            .await,
        ActivityStatus::InterventionTriggered
    );
    engine.resolve_wait().await;
    assert_eq!(
        engine
            .on_search_query("tokio select cancellation", "google", 0.0)
            .await,
        ActivityStatus::Recorded
    );
}

#[tokio::test]
async fn persisted_sessions_feed_the_analyzer() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("flow_patterns.db")).unwrap();

    for i in 0..6 {
        let id = format!("s{i}");
        let started = Utc::now() - Duration::days(2);
        db.insert_session(&id, started).await.unwrap();
        db.finalize_session(&SessionRecord {
            id,
            started_at: started,
            ended_at: Some(started + Duration::minutes(40)),
            duration_secs: 40 * 60,
            focus_score: 88.0,
            fatigue_score: 10.0,
            apm_average: 110.0,
            distraction_count: 1,
            resilience_score: 5,
            stamina_score: 10,
            xp_total: 200,
            xp_breakdown: None,
        })
        .await
        .unwrap();
    }

    let analyzer = PatternAnalyzer::new(db);
    // Six successful 40-minute sessions earn a 10% longer target.
    assert_eq!(analyzer.optimal_threshold_minutes(25).await.unwrap(), 44);
}
