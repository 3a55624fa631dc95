use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// User-tunable knobs for detection and intervention.
///
/// Every field has a hardcoded default so a missing or malformed config
/// file is never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowConfig {
    pub blocked_apps: Vec<String>,
    pub distracting_keywords: Vec<String>,
    pub productive_keywords: Vec<String>,
    pub flow_threshold_minutes: u32,
    pub fatigue_threshold: f64,
    pub soft_reset_seconds: u32,
    pub auto_flow_active_seconds: u32,
    pub classifier_api_key: Option<String>,
    pub classifier_endpoint: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            blocked_apps: [
                "valorant.exe",
                "league of legends.exe",
                "csgo.exe",
                "steam.exe",
                "discord.exe",
            ]
            .map(String::from)
            .to_vec(),
            distracting_keywords: [
                "netflix",
                "twitter",
                "facebook",
                "instagram",
                "reddit",
                "tiktok",
                "shorts",
                "gaming",
            ]
            .map(String::from)
            .to_vec(),
            productive_keywords: [
                "code",
                "visual studio",
                "docs",
                "terminal",
                "notion",
                "obsidian",
            ]
            .map(String::from)
            .to_vec(),
            flow_threshold_minutes: 10,
            fatigue_threshold: 70.0,
            soft_reset_seconds: 45,
            auto_flow_active_seconds: 240,
            classifier_api_key: None,
            classifier_endpoint: "https://api.groq.com/openai/v1/chat/completions".into(),
        }
    }
}

impl FlowConfig {
    pub fn flow_threshold_secs(&self) -> i64 {
        i64::from(self.flow_threshold_minutes) * 60
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<FlowConfig>,
}

impl ConfigStore {
    /// Load from `path` if it exists; otherwise start from defaults.
    pub fn load(path: PathBuf) -> Self {
        let data = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(config) => {
                        info!("User configuration loaded from {}", path.display());
                        config
                    }
                    Err(err) => {
                        warn!("Malformed config at {}: {err}; using defaults", path.display());
                        FlowConfig::default()
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {}: {err}; using defaults", path.display());
                    FlowConfig::default()
                }
            }
        } else {
            info!("No config at {}; using defaults", path.display());
            FlowConfig::default()
        };

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub fn snapshot(&self) -> FlowConfig {
        self.data.read().unwrap().clone()
    }

    /// Mutate the config in place and write it back to disk.
    pub fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut FlowConfig),
    {
        let mut guard = self.data.write().unwrap();
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &FlowConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write config to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let store = ConfigStore::load(PathBuf::from("/nonexistent/flow_config.json"));
        let config = store.snapshot();
        assert_eq!(config.flow_threshold_minutes, 10);
        assert_eq!(config.auto_flow_active_seconds, 240);
        assert!(config.blocked_apps.contains(&"discord.exe".to_string()));
    }

    #[test]
    fn defaults_when_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow_config.json");
        fs::write(&path, "{not json").unwrap();
        let store = ConfigStore::load(path);
        assert_eq!(store.snapshot().fatigue_threshold, 70.0);
    }

    #[test]
    fn update_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow_config.json");
        let store = ConfigStore::load(path.clone());
        store
            .update(|config| config.blocked_apps.push("instagram.exe".into()))
            .unwrap();

        let reloaded = ConfigStore::load(path);
        assert!(reloaded
            .snapshot()
            .blocked_apps
            .contains(&"instagram.exe".to_string()));
    }
}
