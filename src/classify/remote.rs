use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::{Classification, ClassificationOutcome, ClassificationSource};

const CLASSIFY_TIMEOUT_SECS: u64 = 10;
const MODEL: &str = "llama-3.1-8b-instant";

/// Chat-completion backed classifier for ambiguous search queries.
///
/// The request is hard-capped at 10s; callers treat any error as a
/// fail-open neutral result.
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Deserialize)]
struct ClassifierVerdict {
    classification: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

impl RemoteClassifier {
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLASSIFY_TIMEOUT_SECS))
            .build()
            .context("failed to build classifier HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub async fn classify_query(&self, query: &str, engine: &str) -> Result<ClassificationOutcome> {
        let prompt = build_query_prompt(query, engine);

        let payload = json!({
            "model": MODEL,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a productivity assistant that classifies search queries as productive or distracting. Always respond in valid JSON format."
                },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.3,
            "max_tokens": 150,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("classifier request failed")?
            .error_for_status()
            .context("classifier returned an error status")?;

        let completion: CompletionResponse = response
            .json()
            .await
            .context("unexpected classifier response shape")?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| anyhow!("classifier response had no choices"))?;

        parse_verdict(content)
    }
}

fn build_query_prompt(query: &str, engine: &str) -> String {
    format!(
        "Classify this search query as either \"productive\" or \"distracting\" for a user in deep work mode.\n\n\
         Query: {query}\n\
         Search engine: {engine}\n\n\
         Consider:\n\
         - Is this query related to work, learning, or research? (productive)\n\
         - Is this query related to entertainment, social media, or procrastination? (distracting)\n\n\
         Respond in JSON format:\n\
         {{\n    \"classification\": \"productive\" or \"distracting\",\n    \"confidence\": 0.0-1.0,\n    \"reasoning\": \"brief explanation\"\n}}"
    )
}

fn parse_verdict(content: &str) -> Result<ClassificationOutcome> {
    let verdict: ClassifierVerdict =
        serde_json::from_str(content).context("classifier verdict was not valid JSON")?;

    let classification = match verdict.classification.as_str() {
        "productive" => Classification::Productive,
        "distracting" => Classification::Distracting,
        _ => Classification::Neutral,
    };

    Ok(ClassificationOutcome {
        classification,
        confidence: verdict.confidence,
        reasoning: verdict.reasoning,
        source: ClassificationSource::Remote,
    })
}
