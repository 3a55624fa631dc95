pub mod bridge;
pub mod classify;
pub mod config;
pub mod db;
pub mod effects;
pub mod engine;
pub mod patterns;

pub use config::{ConfigStore, FlowConfig};
pub use db::Database;
pub use effects::{EffectBus, EffectCommand};
pub use engine::{ActivityStatus, FlowEngine, StartOutcome, StopOutcome};
pub use patterns::PatternAnalyzer;
