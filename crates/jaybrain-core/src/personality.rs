//! Personality Config
//!
//! A single-row table (id = 1) holding the assistant's voice settings. Read
//! through an accessor, never a process global.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, Result, Store, StoreError};

/// The personality row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub tone: String,
    pub verbosity: String,
    /// Humor dial in [0, 1]
    pub humor: f64,
    /// Proactivity dial in [0, 1]
    pub proactivity: f64,
    pub custom_instructions: String,
    pub updated_at: String,
}

/// Partial update; present fields overwrite.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalityUpdate {
    pub tone: Option<String>,
    pub verbosity: Option<String>,
    pub humor: Option<f64>,
    pub proactivity: Option<f64>,
    pub custom_instructions: Option<String>,
}

impl Store {
    /// Read the personality, seeding the default row on first access.
    pub fn personality_get(&self) -> Result<Personality> {
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT OR IGNORE INTO personality_config (id, updated_at) VALUES (1, ?1)",
                [now_iso()],
            )?;
        }
        let conn = self.read()?;
        let row = conn
            .query_row(
                "SELECT tone, verbosity, humor, proactivity, custom_instructions, updated_at
                 FROM personality_config WHERE id = 1",
                [],
                |row| {
                    Ok(Personality {
                        tone: row.get(0)?,
                        verbosity: row.get(1)?,
                        humor: row.get(2)?,
                        proactivity: row.get(3)?,
                        custom_instructions: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        row.ok_or_else(|| StoreError::NotFound("personality_config".into()))
    }

    /// Apply a partial update. Dials are clamped into [0, 1].
    pub fn personality_set(&self, update: PersonalityUpdate) -> Result<Personality> {
        let current = self.personality_get()?;
        let conn = self.write()?;
        conn.execute(
            "UPDATE personality_config
             SET tone = ?1, verbosity = ?2, humor = ?3, proactivity = ?4,
                 custom_instructions = ?5, updated_at = ?6
             WHERE id = 1",
            params![
                update.tone.unwrap_or(current.tone),
                update.verbosity.unwrap_or(current.verbosity),
                update.humor.unwrap_or(current.humor).clamp(0.0, 1.0),
                update
                    .proactivity
                    .unwrap_or(current.proactivity)
                    .clamp(0.0, 1.0),
                update
                    .custom_instructions
                    .unwrap_or(current.custom_instructions),
                now_iso(),
            ],
        )?;
        drop(conn);
        self.personality_get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_defaults_seeded_on_first_read() {
        let (store, _dir) = test_store();
        let personality = store.personality_get().unwrap();
        assert_eq!(personality.tone, "direct");
        assert_eq!(personality.verbosity, "normal");
    }

    #[test]
    fn test_partial_update_preserves_rest() {
        let (store, _dir) = test_store();
        let updated = store
            .personality_set(PersonalityUpdate {
                humor: Some(0.9),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.humor, 0.9);
        assert_eq!(updated.tone, "direct");
    }

    #[test]
    fn test_dials_clamped() {
        let (store, _dir) = test_store();
        let updated = store
            .personality_set(PersonalityUpdate {
                humor: Some(7.0),
                proactivity: Some(-1.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.humor, 1.0);
        assert_eq!(updated.proactivity, 0.0);
    }
}
