//! Job Search
//!
//! Boards to watch, postings discovered on them, applications with a status
//! pipeline, and per-application interview prep. Posting search rides the
//! FTS5 index; board fetching itself is an external fetcher's job — this
//! module only records what it found.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::search::sanitize_match_query;
use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// Application pipeline states
pub const APPLICATION_STATUSES: &[&str] = &[
    "discovered",
    "preparing",
    "ready",
    "applied",
    "interviewing",
    "offered",
    "accepted",
    "rejected",
    "withdrawn",
];

/// A job board being watched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBoard {
    pub id: String,
    pub name: String,
    pub url: String,
    pub board_type: String,
    pub tags: Vec<String>,
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A discovered posting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub work_mode: String,
    pub location: String,
    pub discovered_at: DateTime<Utc>,
}

/// An application against a posting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub job_id: String,
    pub status: String,
    pub resume_path: String,
    pub cover_letter_path: String,
    pub applied_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Interview prep attached to one application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewPrep {
    pub id: String,
    pub application_id: String,
    pub company_research: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Store::jobs_add`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostingInput {
    pub title: String,
    pub company: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub work_mode: Option<String>,
    pub location: Option<String>,
    pub board_id: Option<String>,
}

fn row_to_posting(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobPosting> {
    let required: String = row.get("required_skills")?;
    let preferred: String = row.get("preferred_skills")?;
    Ok(JobPosting {
        id: row.get("id")?,
        board_id: row.get("board_id")?,
        title: row.get("title")?,
        company: row.get("company")?,
        url: row.get("url")?,
        description: row.get("description")?,
        required_skills: serde_json::from_str(&required).unwrap_or_default(),
        preferred_skills: serde_json::from_str(&preferred).unwrap_or_default(),
        salary_min: row.get("salary_min")?,
        salary_max: row.get("salary_max")?,
        work_mode: row.get("work_mode")?,
        location: row.get("location")?,
        discovered_at: row.get("discovered_at")?,
    })
}

fn row_to_application(row: &rusqlite::Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        status: row.get("status")?,
        resume_path: row.get("resume_path")?,
        cover_letter_path: row.get("cover_letter_path")?,
        applied_date: row.get("applied_date")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const POSTING_COLUMNS: &str = "id, board_id, title, company, url, description, required_skills, preferred_skills, salary_min, salary_max, work_mode, location, discovered_at";
const APPLICATION_COLUMNS: &str = "id, job_id, status, resume_path, cover_letter_path, applied_date, notes, created_at, updated_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Register a board to watch.
    pub fn board_add(&self, name: &str, url: &str, board_type: &str, tags: &[String]) -> Result<JobBoard> {
        if name.trim().is_empty() || url.trim().is_empty() {
            return Err(StoreError::Validation("board name and url are required".into()));
        }
        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO job_boards (id, name, url, board_type, tags, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![
                    id,
                    name,
                    url,
                    if board_type.is_empty() { "listing" } else { board_type },
                    serde_json::to_string(tags).unwrap_or_else(|_| "[]".into()),
                    now_iso(),
                ],
            )?;
        }
        self.get_board(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a board.
    pub fn get_board(&self, id: &str) -> Result<Option<JobBoard>> {
        let conn = self.read()?;
        let board = conn
            .query_row(
                "SELECT id, name, url, board_type, tags, active, last_checked, content_hash, created_at
                 FROM job_boards WHERE id = ?1",
                [id],
                |row| {
                    let tags: String = row.get(4)?;
                    Ok(JobBoard {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                        board_type: row.get(3)?,
                        tags: serde_json::from_str(&tags).unwrap_or_default(),
                        active: row.get::<_, i64>(5)? != 0,
                        last_checked: row.get(6)?,
                        content_hash: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(board)
    }

    /// List boards, active first.
    pub fn board_list(&self, active_only: bool) -> Result<Vec<JobBoard>> {
        let conn = self.read()?;
        let sql = if active_only {
            "SELECT id FROM job_boards WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id FROM job_boards ORDER BY active DESC, name"
        };
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(sql)?;
            stmt.query_map([], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect()
        };
        drop(conn);
        let mut boards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(board) = self.get_board(&id)? {
                boards.push(board);
            }
        }
        Ok(boards)
    }

    /// Record a board check: updates `last_checked` and the content hash.
    /// Returns whether the content changed since the previous check.
    pub fn board_mark_checked(&self, id: &str, content: &str) -> Result<bool> {
        let board = self
            .get_board(id)?
            .ok_or_else(|| StoreError::NotFound(format!("board {id}")))?;
        let hash = hex::encode(Sha256::digest(content.as_bytes()));
        let changed = board.content_hash != hash;
        self.update_row(
            "job_boards",
            id,
            &[
                ("last_checked", serde_json::json!(now_iso())),
                ("content_hash", serde_json::json!(hash)),
            ],
        )?;
        Ok(changed)
    }

    /// Record a discovered posting.
    pub fn jobs_add(&self, input: PostingInput) -> Result<JobPosting> {
        if input.title.trim().is_empty() || input.company.trim().is_empty() {
            return Err(StoreError::Validation(
                "posting title and company are required".into(),
            ));
        }
        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO job_postings
                 (id, board_id, title, company, url, description, required_skills, preferred_skills,
                  salary_min, salary_max, work_mode, location, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id,
                    input.board_id.unwrap_or_default(),
                    input.title,
                    input.company,
                    input.url.unwrap_or_default(),
                    input.description.unwrap_or_default(),
                    serde_json::to_string(&input.required_skills).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&input.preferred_skills).unwrap_or_else(|_| "[]".into()),
                    input.salary_min,
                    input.salary_max,
                    input.work_mode.unwrap_or_default(),
                    input.location.unwrap_or_default(),
                    now_iso(),
                ],
            )?;
        }
        self.get_posting(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a posting.
    pub fn get_posting(&self, id: &str) -> Result<Option<JobPosting>> {
        let conn = self.read()?;
        let posting = conn
            .query_row(
                &format!("SELECT {POSTING_COLUMNS} FROM job_postings WHERE id = ?1"),
                [id],
                |row| row_to_posting(row),
            )
            .optional()?;
        Ok(posting)
    }

    /// Keyword search over postings (title, company, description).
    pub fn jobs_search(&self, query: &str, limit: usize) -> Result<Vec<JobPosting>> {
        let sanitized = sanitize_match_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM job_postings_fts WHERE job_postings_fts MATCH ?1
             ORDER BY bm25(job_postings_fts) LIMIT ?2",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![sanitized, limit as i64], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);

        let mut postings = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(posting) = self.get_posting(&id)? {
                postings.push(posting);
            }
        }
        Ok(postings)
    }

    /// Create an application for a posting. One application per posting;
    /// re-creating returns the existing one with `already_exists`.
    pub fn application_create(&self, job_id: &str) -> Result<(String, Application)> {
        if self.get_posting(job_id)?.is_none() {
            return Err(StoreError::NotFound(format!("posting {job_id}")));
        }
        let existing = {
            let conn = self.read()?;
            conn.query_row(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE job_id = ?1"),
                [job_id],
                |row| row_to_application(row),
            )
            .optional()?
        };
        if let Some(app) = existing {
            return Ok(("already_exists".into(), app));
        }

        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO applications (id, job_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'discovered', ?3, ?3)",
                params![id, job_id, now_iso()],
            )?;
        }
        let app = self
            .get_application(&id)?
            .ok_or_else(|| StoreError::NotFound(id))?;
        Ok(("created".into(), app))
    }

    /// Fetch an application.
    pub fn get_application(&self, id: &str) -> Result<Option<Application>> {
        let conn = self.read()?;
        let app = conn
            .query_row(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                [id],
                |row| row_to_application(row),
            )
            .optional()?;
        Ok(app)
    }

    /// Update an application. Moving to `applied` stamps `applied_date` if
    /// not already set.
    pub fn application_update(
        &self,
        id: &str,
        status: Option<&str>,
        resume_path: Option<&str>,
        cover_letter_path: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Option<Application>> {
        let Some(existing) = self.get_application(id)? else {
            return Ok(None);
        };
        if let Some(s) = status {
            if !APPLICATION_STATUSES.contains(&s) {
                return Err(StoreError::Validation(format!("unknown status '{s}'")));
            }
        }

        let mut fields: Vec<(&str, serde_json::Value)> = Vec::new();
        if let Some(s) = status {
            fields.push(("status", serde_json::json!(s)));
            if s == "applied" && existing.applied_date.is_none() {
                fields.push(("applied_date", serde_json::json!(now_iso())));
            }
        }
        if let Some(p) = resume_path {
            fields.push(("resume_path", serde_json::json!(p)));
        }
        if let Some(p) = cover_letter_path {
            fields.push(("cover_letter_path", serde_json::json!(p)));
        }
        if let Some(n) = notes {
            fields.push(("notes", serde_json::json!(n)));
        }
        if fields.is_empty() {
            return Err(StoreError::Validation("no fields to update".into()));
        }
        fields.push(("updated_at", serde_json::json!(now_iso())));

        self.update_row("applications", id, &fields)?;
        self.get_application(id)
    }

    /// List applications, optionally by status.
    pub fn application_list(&self, status: Option<&str>) -> Result<Vec<Application>> {
        if let Some(s) = status {
            if !APPLICATION_STATUSES.contains(&s) {
                return Err(StoreError::Validation(format!("unknown status '{s}'")));
            }
        }
        let conn = self.read()?;
        let mut apps = Vec::new();
        match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications WHERE status = ?1
                     ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map([s], |row| row_to_application(row))?;
                for row in rows {
                    apps.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map([], |row| row_to_application(row))?;
                for row in rows {
                    apps.push(row?);
                }
            }
        }
        Ok(apps)
    }

    /// Upsert interview prep for an application (one row per application).
    pub fn interview_prep_save(
        &self,
        application_id: &str,
        company_research: &str,
        questions: &[String],
        answers: &[String],
    ) -> Result<InterviewPrep> {
        if self.get_application(application_id)?.is_none() {
            return Err(StoreError::NotFound(format!("application {application_id}")));
        }
        let now = now_iso();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO interview_prep
                 (id, application_id, company_research, questions, answers, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(application_id) DO UPDATE SET
                     company_research = excluded.company_research,
                     questions = excluded.questions,
                     answers = excluded.answers,
                     updated_at = excluded.updated_at",
                params![
                    short_id(),
                    application_id,
                    company_research,
                    serde_json::to_string(questions).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(answers).unwrap_or_else(|_| "[]".into()),
                    now,
                ],
            )?;
        }
        self.interview_prep_get(application_id)?
            .ok_or_else(|| StoreError::NotFound(application_id.to_string()))
    }

    /// Fetch interview prep by application id.
    pub fn interview_prep_get(&self, application_id: &str) -> Result<Option<InterviewPrep>> {
        let conn = self.read()?;
        let prep = conn
            .query_row(
                "SELECT id, application_id, company_research, questions, answers, created_at, updated_at
                 FROM interview_prep WHERE application_id = ?1",
                [application_id],
                |row| {
                    let questions: String = row.get(3)?;
                    let answers: String = row.get(4)?;
                    Ok(InterviewPrep {
                        id: row.get(0)?,
                        application_id: row.get(1)?,
                        company_research: row.get(2)?,
                        questions: serde_json::from_str(&questions).unwrap_or_default(),
                        answers: serde_json::from_str(&answers).unwrap_or_default(),
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(prep)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    fn add_posting(store: &Store, title: &str, company: &str) -> JobPosting {
        store
            .jobs_add(PostingInput {
                title: title.to_string(),
                company: company.to_string(),
                description: Some(format!("{title} at {company}")),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_jobs_add_and_search() {
        let (store, _dir) = test_store();
        let posting = add_posting(&store, "Platform Engineer", "Acme");
        add_posting(&store, "Gardener", "Bloom Co");

        let found = store.jobs_search("platform engineer", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, posting.id);
    }

    #[test]
    fn test_application_create_is_idempotent() {
        let (store, _dir) = test_store();
        let posting = add_posting(&store, "SRE", "Acme");

        let (status, app) = store.application_create(&posting.id).unwrap();
        assert_eq!(status, "created");
        assert_eq!(app.status, "discovered");

        let (status, again) = store.application_create(&posting.id).unwrap();
        assert_eq!(status, "already_exists");
        assert_eq!(again.id, app.id);
    }

    #[test]
    fn test_application_applied_stamps_date() {
        let (store, _dir) = test_store();
        let posting = add_posting(&store, "SRE", "Acme");
        let (_, app) = store.application_create(&posting.id).unwrap();

        let updated = store
            .application_update(&app.id, Some("applied"), None, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, "applied");
        assert!(updated.applied_date.is_some());

        // Second transition keeps the original date
        let first_date = updated.applied_date;
        let again = store
            .application_update(&app.id, Some("applied"), None, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(again.applied_date, first_date);
    }

    #[test]
    fn test_application_rejects_bad_status() {
        let (store, _dir) = test_store();
        let posting = add_posting(&store, "SRE", "Acme");
        let (_, app) = store.application_create(&posting.id).unwrap();
        assert!(store
            .application_update(&app.id, Some("ghosted"), None, None, None)
            .is_err());
    }

    #[test]
    fn test_board_check_detects_content_change() {
        let (store, _dir) = test_store();
        let board = store
            .board_add("Acme Careers", "https://acme.example/careers", "", &[])
            .unwrap();

        // First check always counts as changed (empty hash -> real hash)
        assert!(store.board_mark_checked(&board.id, "listing v1").unwrap());
        assert!(!store.board_mark_checked(&board.id, "listing v1").unwrap());
        assert!(store.board_mark_checked(&board.id, "listing v2").unwrap());
    }

    #[test]
    fn test_interview_prep_upserts() {
        let (store, _dir) = test_store();
        let posting = add_posting(&store, "SRE", "Acme");
        let (_, app) = store.application_create(&posting.id).unwrap();

        let prep = store
            .interview_prep_save(&app.id, "founded 2016", &["Why Acme?".into()], &[])
            .unwrap();
        assert_eq!(prep.questions.len(), 1);

        let prep2 = store
            .interview_prep_save(
                &app.id,
                "founded 2016, series C",
                &["Why Acme?".into(), "Tell me about an incident".into()],
                &["Because ...".into()],
            )
            .unwrap();
        assert_eq!(prep2.id, prep.id);
        assert_eq!(prep2.questions.len(), 2);
        assert_eq!(prep2.answers.len(), 1);
    }
}
