use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use flow_engine::{
    bridge::{self, BridgeMessage, BridgeReply},
    ConfigStore, Database, EffectBus, FlowEngine, StopOutcome,
};

const CONFIG_FILE: &str = "flow_config.json";
const DB_FILE: &str = "flow_patterns.db";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var).
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Flow Engine starting up...");

    let config = Arc::new(ConfigStore::load(CONFIG_FILE.into()));
    let database = Database::new(DB_FILE.into())?;

    // Finalize sessions that were running when the process last died.
    match database.recover_orphan_sessions().await {
        Ok(0) => {}
        Ok(repaired) => warn!("Recovered {repaired} session(s) left open by a previous run"),
        Err(err) => warn!("Orphan session recovery failed: {err}"),
    }

    let (effects, mut effect_rx) = EffectBus::new();
    // The real executor (overlay, DND, audio) lives out of process; log
    // the command stream in its place.
    tokio::spawn(async move {
        while let Some(command) = effect_rx.recv().await {
            info!("effect: {command:?}");
        }
    });

    let engine = Arc::new(FlowEngine::new(config, database, effects).await);

    // Periodic status line while a session runs.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let status = engine.get_status().await;
                if status.is_running {
                    info!(
                        "session {}s in; focus {:.0}, resilience {}, fatigue {:.0}, input {}",
                        status.session_duration,
                        status.focus_score,
                        status.resilience,
                        status.fatigue_score,
                        status.activity_pattern.as_str()
                    );
                }
            }
        });
    }

    // Drive the engine from native-messaging frames on stdio until EOF.
    let bridge_engine = engine.clone();
    let handle = tokio::runtime::Handle::current();
    let bridge_loop = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut stdin = std::io::stdin().lock();
        let mut stdout = std::io::stdout().lock();

        while let Some(frame) = bridge::read_frame(&mut stdin)? {
            let reply = match bridge::decode_message(&frame) {
                Ok(BridgeMessage::BrowserActivity {
                    url,
                    title,
                    timestamp,
                }) => BridgeReply::Status {
                    status: handle
                        .block_on(bridge_engine.on_browser_activity(&url, &title, timestamp)),
                },
                Ok(BridgeMessage::SearchQuery {
                    query,
                    engine: search_engine,
                    timestamp,
                }) => BridgeReply::Status {
                    status: handle
                        .block_on(bridge_engine.on_search_query(&query, &search_engine, timestamp)),
                },
                Err(err) => {
                    warn!("rejecting malformed bridge frame: {err}");
                    BridgeReply::Error {
                        error: err.to_string(),
                    }
                }
            };
            bridge::write_frame(&mut stdout, &bridge::encode_reply(&reply)?)?;
        }

        Ok(())
    });

    bridge_loop.await??;

    // Close out a still-running session before exiting.
    if let StopOutcome::Stopped { xp_earned, .. } = engine.stop_session().await {
        info!("Closed active session on shutdown ({xp_earned} XP)");
    }

    info!("Flow Engine shutting down");
    Ok(())
}
