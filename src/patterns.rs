//! Historical pattern analysis over persisted sessions and app usage.
//!
//! Learns which apps repeatedly break flow (and auto-blocks them), which
//! hours of day carry the best flow quality, and how long the user can
//! realistically hold a session (progressive overload).

use anyhow::Result;
use log::info;

use crate::config::ConfigStore;
use crate::db::Database;

/// Flow breaks before an app qualifies for auto-blocking.
pub const AUTO_BLOCK_THRESHOLD: i64 = 5;

const OVERLOAD_SUCCESS_RATE: f64 = 0.8;
const STRUGGLE_SUCCESS_RATE: f64 = 0.4;
const SUCCESS_FOCUS_SCORE: f64 = 70.0;
const MIN_SESSIONS_FOR_TUNING: usize = 5;
const MIN_THRESHOLD_MINUTES: i64 = 10;

pub struct PatternAnalyzer {
    db: Database,
}

impl PatternAnalyzer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apps that broke flow at least `threshold` times and are not yet
    /// blocked.
    pub async fn frequent_distractions(&self, threshold: i64) -> Result<Vec<String>> {
        self.db.frequent_distractions(threshold).await
    }

    /// Block every frequent offender: flags the pattern row and appends
    /// the app to the config's blocked list so the next classification
    /// catches it. Returns the newly blocked app names.
    pub async fn apply_auto_blocking(
        &self,
        config: &ConfigStore,
        threshold: i64,
    ) -> Result<Vec<String>> {
        let offenders = self.db.frequent_distractions(threshold).await?;

        for app in &offenders {
            self.db.mark_auto_blocked(app).await?;
            info!("Auto-blocked: {app}");
        }

        if !offenders.is_empty() {
            let additions = offenders.clone();
            config.update(move |config| {
                for app in additions {
                    if !config
                        .blocked_apps
                        .iter()
                        .any(|existing| existing.eq_ignore_ascii_case(&app))
                    {
                        config.blocked_apps.push(app);
                    }
                }
            })?;
        }

        Ok(offenders)
    }

    /// Recommended flow threshold in minutes from the last two weeks of
    /// sessions. Progressive overload: a high success rate earns a 10%
    /// longer target, a low one a 10% shorter target floored at 10
    /// minutes. Too little data returns the baseline untouched.
    pub async fn optimal_threshold_minutes(&self, baseline_minutes: i64) -> Result<i64> {
        let sessions = self.db.sessions_since_days(14).await?;
        if sessions.len() < MIN_SESSIONS_FOR_TUNING {
            return Ok(baseline_minutes);
        }

        let successful: Vec<_> = sessions
            .iter()
            .filter(|s| s.focus_score > SUCCESS_FOCUS_SCORE)
            .collect();
        let success_rate = successful.len() as f64 / sessions.len() as f64;

        let avg_minutes = if successful.is_empty() {
            baseline_minutes
        } else {
            let total_secs: i64 = successful.iter().map(|s| s.duration_secs).sum();
            total_secs / successful.len() as i64 / 60
        };

        let recommended = if success_rate > OVERLOAD_SUCCESS_RATE {
            let raised = (avg_minutes as f64 * 1.1) as i64;
            info!("Progressive overload: {avg_minutes}min -> {raised}min");
            raised
        } else if success_rate < STRUGGLE_SUCCESS_RATE {
            let lowered = ((avg_minutes as f64 * 0.9) as i64).max(MIN_THRESHOLD_MINUTES);
            info!("Adaptive reduction: {avg_minutes}min -> {lowered}min");
            lowered
        } else {
            avg_minutes
        };

        Ok(recommended)
    }

    /// Hours of day with the best historical flow quality.
    pub async fn peak_flow_hours(&self, days: i64) -> Result<Vec<u32>> {
        self.db.peak_flow_hours(days).await
    }
}
