//! Persisted data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::session::{level_for_xp, XpBreakdown};

/// One completed (or still-open) flow session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub focus_score: f64,
    pub fatigue_score: f64,
    pub apm_average: f64,
    pub distraction_count: i64,
    pub resilience_score: i64,
    pub stamina_score: i64,
    pub xp_total: i64,
    pub xp_breakdown: Option<XpBreakdown>,
}

#[cfg(test)]
impl SessionRecord {
    pub fn sample() -> Self {
        Self {
            id: "test-session".into(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            duration_secs: 0,
            focus_score: 0.0,
            fatigue_score: 0.0,
            apm_average: 0.0,
            distraction_count: 0,
            resilience_score: 0,
            stamina_score: 0,
            xp_total: 0,
            xp_breakdown: None,
        }
    }
}

/// Per-app usage aggregate used by the pattern analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPattern {
    pub app_name: String,
    pub total_time_secs: i64,
    pub flow_breaks: i64,
    pub productive_sessions: i64,
    pub distraction_sessions: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    pub auto_blocked: bool,
}

/// Per (date, hour) flow-quality aggregate for biological patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowWindow {
    pub date: NaiveDate,
    pub hour: u32,
    pub flow_quality: f64,
    pub apm_average: f64,
    pub duration_minutes: i64,
}

/// The one-time baseline plus level-up drift, all axes 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveProfile {
    pub focus: f64,
    pub stamina: f64,
    pub resilience: f64,
    pub consistency: f64,
}

/// Lifetime progression for the single local user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub total_xp: i64,
    pub level: i64,
    pub sessions_completed: i64,
    pub cognitive: Option<CognitiveProfile>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            total_xp: 0,
            level: 1,
            sessions_completed: 0,
            cognitive: None,
        }
    }
}

impl UserProfile {
    /// Add XP and recompute the level. Returns how many levels were
    /// gained (0 for most additions).
    pub fn add_xp(&mut self, amount: i64) -> i64 {
        self.total_xp += amount;
        let new_level = level_for_xp(self.total_xp);
        let gained = (new_level - self.level).max(0);
        self.level = self.level.max(new_level);
        gained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_accumulates_and_levels() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.add_xp(50), 0);
        assert_eq!(profile.level, 1);
        assert_eq!(profile.add_xp(60), 1);
        assert_eq!(profile.level, 2);
        assert_eq!(profile.add_xp(300), 3);
        assert_eq!(profile.level, 5);
        assert_eq!(profile.total_xp, 410);
    }
}
