use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::warn;
use rusqlite::{params, Row};

use crate::db::{parse_datetime, Database, SessionRecord};

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let breakdown_json: Option<String> = row.get("xp_breakdown")?;

    let xp_breakdown = breakdown_json.and_then(|json| {
        serde_json::from_str(&json)
            .map_err(|err| warn!("discarding malformed xp breakdown: {err}"))
            .ok()
    });

    Ok(SessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at)?,
        ended_at: ended_at.map(|value| parse_datetime(&value)).transpose()?,
        duration_secs: row.get("duration_secs")?,
        focus_score: row.get("focus_score")?,
        fatigue_score: row.get("fatigue_score")?,
        apm_average: row.get("apm_average")?,
        distraction_count: row.get("distraction_count")?,
        resilience_score: row.get("resilience_score")?,
        stamina_score: row.get("stamina_score")?,
        xp_total: row.get("xp_total")?,
        xp_breakdown,
    })
}

const SESSION_COLUMNS: &str = "id, started_at, ended_at, duration_secs, focus_score, \
     fatigue_score, apm_average, distraction_count, resilience_score, stamina_score, \
     xp_total, xp_breakdown";

impl Database {
    pub async fn insert_session(&self, id: &str, started_at: DateTime<Utc>) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sessions (id, started_at) VALUES (?1, ?2)",
                params![id, started_at.to_rfc3339()],
            )
            .context("failed to insert session")?;
            Ok(())
        })
        .await
    }

    /// Write the full end-of-session record.
    pub async fn finalize_session(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let breakdown_json = record
                .xp_breakdown
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("failed to serialize xp breakdown")?;

            // Upsert: the start-of-session insert is fire-and-forget and
            // may not have landed yet.
            conn.execute(
                "INSERT INTO sessions
                     (id, started_at, ended_at, duration_secs, focus_score, fatigue_score,
                      apm_average, distraction_count, resilience_score, stamina_score,
                      xp_total, xp_breakdown)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                     ended_at = ?3,
                     duration_secs = ?4,
                     focus_score = ?5,
                     fatigue_score = ?6,
                     apm_average = ?7,
                     distraction_count = ?8,
                     resilience_score = ?9,
                     stamina_score = ?10,
                     xp_total = ?11,
                     xp_breakdown = ?12",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.duration_secs,
                    record.focus_score,
                    record.fatigue_score,
                    record.apm_average,
                    record.distraction_count,
                    record.resilience_score,
                    record.stamina_score,
                    record.xp_total,
                    breakdown_json,
                ],
            )
            .context("failed to finalize session")?;
            Ok(())
        })
        .await
    }

    /// Oldest completed sessions, for the cognitive-profile baseline.
    pub async fn first_completed_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE ended_at IS NOT NULL
                 ORDER BY started_at ASC
                 LIMIT ?1",
            ))?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 ORDER BY started_at DESC
                 LIMIT ?1",
            ))?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Completed sessions that started within the last `days` days.
    pub async fn sessions_since_days(&self, days: i64) -> Result<Vec<SessionRecord>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE ended_at IS NOT NULL AND started_at >= ?1
                 ORDER BY started_at DESC",
            ))?;
            let mut rows = stmt.query(params![cutoff])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Close out sessions left open by a crash. Returns how many rows were
    /// repaired.
    pub async fn recover_orphan_sessions(&self) -> Result<usize> {
        self.execute(|conn| {
            let repaired = conn
                .execute(
                    "UPDATE sessions SET ended_at = started_at, duration_secs = 0
                     WHERE ended_at IS NULL",
                    [],
                )
                .context("failed to recover orphan sessions")?;
            Ok(repaired)
        })
        .await
    }
}
