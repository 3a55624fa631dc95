use crate::config::FlowConfig;

use super::{Classification, ClassificationOutcome, ClassificationSource};

/// Exact, case-insensitive process-name match against the blocked list.
pub fn is_blocked_app(config: &FlowConfig, process_name: &str) -> bool {
    let process = process_name.to_lowercase();
    config
        .blocked_apps
        .iter()
        .any(|app| app.to_lowercase() == process)
}

/// Substring keyword matching over lowercased free text (titles, URLs,
/// queries). Distracting keywords are checked before productive ones so a
/// title matching both still interrupts.
pub fn match_text(config: &FlowConfig, text: &str) -> ClassificationOutcome {
    let haystack = text.to_lowercase();

    if let Some(keyword) = config
        .distracting_keywords
        .iter()
        .find(|k| haystack.contains(&k.to_lowercase()))
    {
        return ClassificationOutcome {
            classification: Classification::Distracting,
            confidence: 0.8,
            reasoning: format!("matched distracting keyword: {keyword}"),
            source: ClassificationSource::Keyword,
        };
    }

    if let Some(keyword) = config
        .productive_keywords
        .iter()
        .find(|k| haystack.contains(&k.to_lowercase()))
    {
        return ClassificationOutcome {
            classification: Classification::Productive,
            confidence: 0.7,
            reasoning: format!("matched productive keyword: {keyword}"),
            source: ClassificationSource::Keyword,
        };
    }

    ClassificationOutcome {
        classification: Classification::Neutral,
        confidence: 0.5,
        reasoning: "no clear indicators".into(),
        source: ClassificationSource::Keyword,
    }
}
