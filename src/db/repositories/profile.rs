use anyhow::{Context, Result};
use rusqlite::params;

use crate::db::{CognitiveProfile, Database, UserProfile};

impl Database {
    /// Load the single local user profile; the row always exists after
    /// migrations.
    pub async fn load_profile(&self) -> Result<UserProfile> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT total_xp, level, sessions_completed,
                        profile_focus, profile_stamina, profile_resilience, profile_consistency
                 FROM user_profile WHERE id = 1",
            )?;
            let profile = stmt.query_row([], |row| {
                let focus: Option<f64> = row.get(3)?;
                let stamina: Option<f64> = row.get(4)?;
                let resilience: Option<f64> = row.get(5)?;
                let consistency: Option<f64> = row.get(6)?;
                let cognitive = match (focus, stamina, resilience, consistency) {
                    (Some(focus), Some(stamina), Some(resilience), Some(consistency)) => {
                        Some(CognitiveProfile {
                            focus,
                            stamina,
                            resilience,
                            consistency,
                        })
                    }
                    _ => None,
                };
                Ok(UserProfile {
                    total_xp: row.get(0)?,
                    level: row.get(1)?,
                    sessions_completed: row.get(2)?,
                    cognitive,
                })
            })?;
            Ok(profile)
        })
        .await
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let profile = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE user_profile
                 SET total_xp = ?1,
                     level = ?2,
                     sessions_completed = ?3,
                     profile_focus = ?4,
                     profile_stamina = ?5,
                     profile_resilience = ?6,
                     profile_consistency = ?7
                 WHERE id = 1",
                params![
                    profile.total_xp,
                    profile.level,
                    profile.sessions_completed,
                    profile.cognitive.as_ref().map(|c| c.focus),
                    profile.cognitive.as_ref().map(|c| c.stamina),
                    profile.cognitive.as_ref().map(|c| c.resilience),
                    profile.cognitive.as_ref().map(|c| c.consistency),
                ],
            )
            .context("failed to save user profile")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    #[tokio::test]
    async fn fresh_database_has_default_profile() {
        let (db, _dir) = test_database();
        let profile = db.load_profile().await.unwrap();
        assert_eq!(profile.total_xp, 0);
        assert_eq!(profile.level, 1);
        assert!(profile.cognitive.is_none());
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let (db, _dir) = test_database();
        let mut profile = db.load_profile().await.unwrap();
        profile.add_xp(230);
        profile.sessions_completed = 3;
        profile.cognitive = Some(CognitiveProfile {
            focus: 80.0,
            stamina: 60.0,
            resilience: 25.0,
            consistency: 90.0,
        });
        db.save_profile(&profile).await.unwrap();

        let loaded = db.load_profile().await.unwrap();
        assert_eq!(loaded.total_xp, 230);
        assert_eq!(loaded.level, 3);
        assert_eq!(loaded.sessions_completed, 3);
        assert_eq!(loaded.cognitive.unwrap().consistency, 90.0);
    }
}
