use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{parse_datetime, AppPattern, Database, FlowWindow};

fn row_to_pattern(row: &Row) -> Result<AppPattern> {
    let last_used: Option<String> = row.get("last_used")?;
    Ok(AppPattern {
        app_name: row.get("app_name")?,
        total_time_secs: row.get("total_time_secs")?,
        flow_breaks: row.get("flow_breaks")?,
        productive_sessions: row.get("productive_sessions")?,
        distraction_sessions: row.get("distraction_sessions")?,
        last_used: last_used.map(|value| parse_datetime(&value)).transpose()?,
        is_blocked: row.get::<_, i64>("is_blocked")? != 0,
        auto_blocked: row.get::<_, i64>("auto_blocked")? != 0,
    })
}

impl Database {
    /// Upsert one app-usage observation.
    pub async fn log_app_usage(
        &self,
        app_name: &str,
        duration_secs: i64,
        is_productive: bool,
        broke_flow: bool,
    ) -> Result<()> {
        let app_name = app_name.to_string();
        let now = Utc::now().to_rfc3339();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO app_patterns
                     (app_name, total_time_secs, flow_breaks, productive_sessions,
                      distraction_sessions, last_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(app_name) DO UPDATE SET
                     total_time_secs = total_time_secs + ?2,
                     flow_breaks = flow_breaks + ?3,
                     productive_sessions = productive_sessions + ?4,
                     distraction_sessions = distraction_sessions + ?5,
                     last_used = ?6",
                params![
                    app_name,
                    duration_secs,
                    i64::from(broke_flow),
                    i64::from(is_productive),
                    i64::from(!is_productive),
                    now,
                ],
            )
            .context("failed to log app usage")?;
            Ok(())
        })
        .await
    }

    pub async fn app_patterns(&self, limit: usize) -> Result<Vec<AppPattern>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT app_name, total_time_secs, flow_breaks, productive_sessions,
                        distraction_sessions, last_used, is_blocked, auto_blocked
                 FROM app_patterns
                 ORDER BY total_time_secs DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut patterns = Vec::new();
            while let Some(row) = rows.next()? {
                patterns.push(row_to_pattern(row)?);
            }
            Ok(patterns)
        })
        .await
    }

    /// Apps that broke flow at least `threshold` times and are not yet
    /// auto-blocked.
    pub async fn frequent_distractions(&self, threshold: i64) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT app_name FROM app_patterns
                 WHERE flow_breaks >= ?1 AND auto_blocked = 0
                 ORDER BY flow_breaks DESC",
            )?;
            let mut rows = stmt.query(params![threshold])?;
            let mut apps = Vec::new();
            while let Some(row) = rows.next()? {
                apps.push(row.get::<_, String>(0)?);
            }
            Ok(apps)
        })
        .await
    }

    pub async fn mark_auto_blocked(&self, app_name: &str) -> Result<()> {
        let app_name = app_name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE app_patterns SET auto_blocked = 1, is_blocked = 1 WHERE app_name = ?1",
                params![app_name],
            )
            .context("failed to mark app auto-blocked")?;
            Ok(())
        })
        .await
    }

    /// Upsert flow quality for an (date, hour) window; repeated sessions
    /// in the same hour are averaged in.
    pub async fn log_flow_window(&self, window: &FlowWindow) -> Result<()> {
        let window = window.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO flow_windows (date, hour, flow_quality, apm_average, duration_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(date, hour) DO UPDATE SET
                     flow_quality = (flow_quality + ?3) / 2,
                     apm_average = (apm_average + ?4) / 2,
                     duration_minutes = duration_minutes + ?5",
                params![
                    window.date.to_string(),
                    window.hour,
                    window.flow_quality,
                    window.apm_average,
                    window.duration_minutes,
                ],
            )
            .context("failed to log flow window")?;
            Ok(())
        })
        .await
    }

    /// Hours of day with the best average flow quality, strongest first.
    /// An hour needs at least three recorded days to qualify.
    pub async fn peak_flow_hours(&self, days: i64) -> Result<Vec<u32>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days))
            .date_naive()
            .to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT hour, AVG(flow_quality) AS avg_quality
                 FROM flow_windows
                 WHERE date >= ?1
                 GROUP BY hour
                 HAVING COUNT(*) >= 3
                 ORDER BY avg_quality DESC
                 LIMIT 5",
            )?;
            let mut rows = stmt.query(params![cutoff])?;
            let mut hours = Vec::new();
            while let Some(row) = rows.next()? {
                hours.push(row.get::<_, u32>(0)?);
            }
            Ok(hours)
        })
        .await
    }
}
