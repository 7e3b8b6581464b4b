//! Life Domains & Goals
//!
//! Domains carry a priority and a weekly-hours target that the
//! time-allocation report compares against. Goals carry progress and feed
//! the staleness heartbeat. Domains are optional; nothing here is seeded.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// A life domain (career, health, learning, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeDomain {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Higher sorts earlier
    pub priority: i64,
    /// Weekly hours target; 0 means untracked
    pub hours_per_week: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A goal within a domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeGoal {
    pub id: String,
    pub domain_id: String,
    pub title: String,
    pub status: String,
    pub progress: f64,
    pub target_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_domain(row: &rusqlite::Row<'_>) -> rusqlite::Result<LifeDomain> {
    Ok(LifeDomain {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        hours_per_week: row.get("hours_per_week")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<LifeGoal> {
    Ok(LifeGoal {
        id: row.get("id")?,
        domain_id: row.get("domain_id")?,
        title: row.get("title")?,
        status: row.get("status")?,
        progress: row.get("progress")?,
        target_date: row.get("target_date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const DOMAIN_COLUMNS: &str = "id, name, description, priority, hours_per_week, created_at, updated_at";
const GOAL_COLUMNS: &str = "id, domain_id, title, status, progress, target_date, created_at, updated_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Create or update a domain by name.
    pub fn life_domain_upsert(
        &self,
        name: &str,
        description: &str,
        priority: i64,
        hours_per_week: f64,
    ) -> Result<LifeDomain> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("domain name is required".into()));
        }
        let now = now_iso();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO life_domains (id, name, description, priority, hours_per_week, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                     description = excluded.description,
                     priority = excluded.priority,
                     hours_per_week = excluded.hours_per_week,
                     updated_at = excluded.updated_at",
                params![short_id(), name, description, priority, hours_per_week, now],
            )?;
        }
        self.life_domain_by_name(name)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Fetch a domain by name.
    pub fn life_domain_by_name(&self, name: &str) -> Result<Option<LifeDomain>> {
        let conn = self.read()?;
        let domain = conn
            .query_row(
                &format!("SELECT {DOMAIN_COLUMNS} FROM life_domains WHERE name = ?1"),
                [name],
                |row| row_to_domain(row),
            )
            .optional()?;
        Ok(domain)
    }

    /// Domains ordered by priority (highest first).
    pub fn life_domains(&self) -> Result<Vec<LifeDomain>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM life_domains ORDER BY priority DESC, name"
        ))?;
        let rows = stmt
            .query_map([], |row| row_to_domain(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Create a goal in a domain.
    pub fn life_goal_create(
        &self,
        domain_id: &str,
        title: &str,
        target_date: Option<&str>,
    ) -> Result<LifeGoal> {
        if title.trim().is_empty() {
            return Err(StoreError::Validation("goal title is required".into()));
        }
        let domain_exists: bool = {
            let conn = self.read()?;
            conn.query_row(
                "SELECT COUNT(*) FROM life_domains WHERE id = ?1",
                [domain_id],
                |row| row.get::<_, i64>(0),
            )? > 0
        };
        if !domain_exists {
            return Err(StoreError::NotFound(format!("domain {domain_id}")));
        }

        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO life_goals (id, domain_id, title, target_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, domain_id, title, target_date, now_iso()],
            )?;
        }
        self.life_goal(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a goal.
    pub fn life_goal(&self, id: &str) -> Result<Option<LifeGoal>> {
        let conn = self.read()?;
        let goal = conn
            .query_row(
                &format!("SELECT {GOAL_COLUMNS} FROM life_goals WHERE id = ?1"),
                [id],
                |row| row_to_goal(row),
            )
            .optional()?;
        Ok(goal)
    }

    /// Update goal progress/status. Progress is clamped to [0, 1]; reaching
    /// 1.0 flips the status to `completed`.
    pub fn life_goal_update(
        &self,
        id: &str,
        progress: Option<f64>,
        status: Option<&str>,
    ) -> Result<Option<LifeGoal>> {
        let Some(_goal) = self.life_goal(id)? else {
            return Ok(None);
        };
        let now = now_iso();
        let conn = self.write()?;
        if let Some(progress) = progress {
            let progress = progress.clamp(0.0, 1.0);
            let status = if progress >= 1.0 { "completed" } else { "active" };
            conn.execute(
                "UPDATE life_goals SET progress = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                params![progress, status, now, id],
            )?;
        }
        if let Some(status) = status {
            conn.execute(
                "UPDATE life_goals SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status, now, id],
            )?;
        }
        drop(conn);
        self.life_goal(id)
    }

    /// Active goals not updated since `cutoff`.
    pub fn stale_goals(&self, cutoff: DateTime<Utc>) -> Result<Vec<(LifeGoal, String)>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.domain_id, g.title, g.status, g.progress, g.target_date,
                    g.created_at, g.updated_at, d.name AS domain_name
             FROM life_goals g JOIN life_domains d ON d.id = g.domain_id
             WHERE g.status = 'active' AND g.updated_at < ?1",
        )?;
        let rows = stmt
            .query_map([cutoff.to_rfc3339()], |row| {
                Ok((row_to_goal(row)?, row.get::<_, String>("domain_name")?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

// ============================================================================
// TESTS
// ============================================================================
