//! Classification oracle: labels apps, URLs and search queries as
//! productive, distracting or neutral.
//!
//! Precedence is fixed: the blocked-app list (exact process match) wins,
//! then local keyword matching, and the remote classifier is consulted
//! only for ambiguous free-text search queries. Any remote failure fails
//! open to neutral.

mod keywords;
mod remote;

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::FlowConfig;
pub use remote::RemoteClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Productive,
    Distracting,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationSource {
    BlockedList,
    Keyword,
    Remote,
    FailOpen,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub confidence: f64,
    pub reasoning: String,
    pub source: ClassificationSource,
}

impl ClassificationOutcome {
    pub fn fail_open(reasoning: impl Into<String>) -> Self {
        Self {
            classification: Classification::Neutral,
            confidence: 0.0,
            reasoning: reasoning.into(),
            source: ClassificationSource::FailOpen,
        }
    }

    pub fn is_distracting(&self) -> bool {
        self.classification == Classification::Distracting
    }

    pub fn is_productive(&self) -> bool {
        self.classification == Classification::Productive
    }
}

pub struct Classifier {
    remote: Option<RemoteClassifier>,
    query_cache: Mutex<HashMap<String, ClassificationOutcome>>,
}

impl Classifier {
    pub fn new(config: &FlowConfig) -> Self {
        let remote = match &config.classifier_api_key {
            Some(key) if !key.is_empty() => {
                match RemoteClassifier::new(config.classifier_endpoint.clone(), key.clone()) {
                    Ok(remote) => Some(remote),
                    Err(err) => {
                        warn!("remote classifier unavailable: {err}; keyword matching only");
                        None
                    }
                }
            }
            _ => None,
        };

        Self {
            remote,
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Window classification never reaches the remote classifier.
    pub fn classify_window(
        &self,
        config: &FlowConfig,
        app_name: &str,
        title: &str,
    ) -> ClassificationOutcome {
        if keywords::is_blocked_app(config, app_name) {
            return ClassificationOutcome {
                classification: Classification::Distracting,
                confidence: 1.0,
                reasoning: format!("blocked application: {app_name}"),
                source: ClassificationSource::BlockedList,
            };
        }
        keywords::match_text(config, &format!("{app_name} {title}"))
    }

    /// URL classification is keyword-only as well.
    pub fn classify_url(&self, config: &FlowConfig, url: &str) -> ClassificationOutcome {
        keywords::match_text(config, url)
    }

    /// Search queries fall through keywords to the remote classifier;
    /// failures and timeouts are logged and treated as neutral.
    pub async fn classify_query(
        &self,
        config: &FlowConfig,
        query: &str,
        engine: &str,
    ) -> ClassificationOutcome {
        let local = keywords::match_text(config, query);
        if local.classification != Classification::Neutral {
            return local;
        }

        let Some(remote) = &self.remote else {
            return local;
        };

        {
            let cache = self.query_cache.lock().await;
            if let Some(hit) = cache.get(query) {
                return hit.clone();
            }
        }

        match remote.classify_query(query, engine).await {
            Ok(outcome) => {
                self.query_cache
                    .lock()
                    .await
                    .insert(query.to_string(), outcome.clone());
                outcome
            }
            Err(err) => {
                warn!("query classification failed: {err}");
                ClassificationOutcome::fail_open("classifier error")
            }
        }
    }
}
