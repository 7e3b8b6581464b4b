//! Forge — Spaced Repetition
//!
//! Concepts, exam subjects with weighted objectives, reviews under the
//! v1/v2 scoring tables, the error taxonomy, and study streaks. The queue,
//! readiness, and calibration views live in [`queue`]; the scoring tables in
//! [`scoring`].

pub mod queue;
pub mod scoring;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, short_id, Result, Store, StoreError};
use scoring::{
    classify_error, mastery_delta_v1, mastery_delta_v2, next_interval_days, ReviewOutcome,
};

// ============================================================================
// TYPES
// ============================================================================

/// Concept difficulty
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

/// Bloom's taxonomy level, stored as data (no upgrade rules)
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    #[default]
    Remember,
    Understand,
    Apply,
    Analyze,
}

impl BloomLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloomLevel::Remember => "remember",
            BloomLevel::Understand => "understand",
            BloomLevel::Apply => "apply",
            BloomLevel::Analyze => "analyze",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "remember" => Some(BloomLevel::Remember),
            "understand" => Some(BloomLevel::Understand),
            "apply" => Some(BloomLevel::Apply),
            "analyze" => Some(BloomLevel::Analyze),
            _ => None,
        }
    }
}

/// A study concept
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeConcept {
    pub id: String,
    pub term: String,
    pub definition: String,
    pub category: String,
    pub difficulty: String,
    pub bloom_level: String,
    pub mastery_level: f64,
    pub review_count: i64,
    pub correct_count: i64,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
}

/// An exam subject
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeSubject {
    pub id: String,
    pub name: String,
    pub exam_date: Option<String>,
    pub pass_score: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A weighted syllabus slot within a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeObjective {
    pub id: String,
    pub subject_id: String,
    pub code: String,
    pub title: String,
    pub domain: String,
    pub exam_weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Store::forge_add_concept`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConceptInput {
    pub term: String,
    pub definition: String,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub bloom_level: Option<String>,
    pub tags: Vec<String>,
    pub subject_id: Option<String>,
    /// Objective ids to link (many-to-many)
    pub objective_ids: Vec<String>,
}

/// Input for [`Store::forge_record_review`]
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub concept_id: String,
    pub outcome: String,
    pub confidence: i64,
    /// Tri-state: explicit correctness engages v2 scoring
    pub was_correct: Option<bool>,
    pub notes: Option<String>,
    pub time_spent_seconds: Option<i64>,
}

/// Outcome of recording a review
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecorded {
    pub concept: ForgeConcept,
    pub mastery_delta: f64,
    /// Populated only for wrong v2 answers
    pub error_type: Option<String>,
    pub next_review: DateTime<Utc>,
}

/// Aggregate deck statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeStats {
    pub total_concepts: i64,
    pub avg_mastery: f64,
    pub due_count: i64,
    pub new_count: i64,
    pub struggling_count: i64,
    pub reviews_today: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
}

/// Per-category aggregates for the knowledge map
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: String,
    pub concept_count: i64,
    pub avg_mastery: f64,
    pub struggling_count: i64,
}

/// A recent error pattern, joined with its concept term
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPatternRow {
    pub concept_id: String,
    pub term: String,
    pub error_type: String,
    pub confidence: i64,
    pub mastery_at_error: f64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Error analysis rollup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    /// error_type -> count
    pub by_type: std::collections::BTreeMap<String, i64>,
    pub recent: Vec<ErrorPatternRow>,
}

pub(crate) fn row_to_concept(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForgeConcept> {
    let tags: String = row.get("tags")?;
    Ok(ForgeConcept {
        id: row.get("id")?,
        term: row.get("term")?,
        definition: row.get("definition")?,
        category: row.get("category")?,
        difficulty: row.get("difficulty")?,
        bloom_level: row.get("bloom_level")?,
        mastery_level: row.get("mastery_level")?,
        review_count: row.get("review_count")?,
        correct_count: row.get("correct_count")?,
        last_reviewed: row.get("last_reviewed")?,
        next_review: row.get("next_review")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        subject_id: row.get("subject_id")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) const CONCEPT_COLUMNS: &str = "id, term, definition, category, difficulty, bloom_level, mastery_level, review_count, correct_count, last_reviewed, next_review, tags, subject_id, created_at";

fn row_to_objective(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForgeObjective> {
    Ok(ForgeObjective {
        id: row.get("id")?,
        subject_id: row.get("subject_id")?,
        code: row.get("code")?,
        title: row.get("title")?,
        domain: row.get("domain")?,
        exam_weight: row.get("exam_weight")?,
        created_at: row.get("created_at")?,
    })
}

const OBJECTIVE_COLUMNS: &str = "id, subject_id, code, title, domain, exam_weight, created_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Create a subject. Duplicate names are rejected.
    pub fn forge_add_subject(
        &self,
        name: &str,
        exam_date: Option<&str>,
        pass_score: f64,
        description: &str,
    ) -> Result<ForgeSubject> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("subject name is required".into()));
        }
        if !(0.0..=1.0).contains(&pass_score) {
            return Err(StoreError::Validation(format!(
                "pass_score must be in [0, 1], got {pass_score}"
            )));
        }
        if let Some(date) = exam_date {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(StoreError::Validation(format!(
                    "exam_date must be YYYY-MM-DD, got '{date}'"
                )));
            }
        }
        if self.forge_subject_by_name(name)?.is_some() {
            return Err(StoreError::Validation(format!(
                "subject '{name}' already exists"
            )));
        }

        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO forge_subjects (id, name, exam_date, pass_score, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, exam_date, pass_score, description, now_iso()],
            )?;
        }
        self.forge_get_subject(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a subject by id.
    pub fn forge_get_subject(&self, id: &str) -> Result<Option<ForgeSubject>> {
        let conn = self.read()?;
        let subject = conn
            .query_row(
                "SELECT id, name, exam_date, pass_score, description, created_at
                 FROM forge_subjects WHERE id = ?1",
                [id],
                |row| {
                    Ok(ForgeSubject {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        exam_date: row.get(2)?,
                        pass_score: row.get(3)?,
                        description: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(subject)
    }

    /// Fetch a subject by name.
    pub fn forge_subject_by_name(&self, name: &str) -> Result<Option<ForgeSubject>> {
        let conn = self.read()?;
        let subject = conn
            .query_row(
                "SELECT id, name, exam_date, pass_score, description, created_at
                 FROM forge_subjects WHERE name = ?1",
                [name],
                |row| {
                    Ok(ForgeSubject {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        exam_date: row.get(2)?,
                        pass_score: row.get(3)?,
                        description: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(subject)
    }

    /// Add an objective to a subject. `(subject, code)` must be unique.
    pub fn forge_add_objective(
        &self,
        subject_id: &str,
        code: &str,
        title: &str,
        domain: &str,
        exam_weight: f64,
    ) -> Result<ForgeObjective> {
        if self.forge_get_subject(subject_id)?.is_none() {
            return Err(StoreError::NotFound(format!("subject {subject_id}")));
        }
        if !(0.0..=1.0).contains(&exam_weight) {
            return Err(StoreError::Validation(format!(
                "exam_weight must be in [0, 1], got {exam_weight}"
            )));
        }

        let exists: bool = {
            let conn = self.read()?;
            conn.query_row(
                "SELECT COUNT(*) FROM forge_objectives WHERE subject_id = ?1 AND code = ?2",
                params![subject_id, code],
                |row| row.get::<_, i64>(0),
            )? > 0
        };
        if exists {
            return Err(StoreError::Validation(format!(
                "objective '{code}' already exists for this subject"
            )));
        }

        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO forge_objectives (id, subject_id, code, title, domain, exam_weight, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, subject_id, code, title, domain, exam_weight, now_iso()],
            )?;
        }
        let conn = self.read()?;
        let objective = conn.query_row(
            &format!("SELECT {OBJECTIVE_COLUMNS} FROM forge_objectives WHERE id = ?1"),
            [&id],
            |row| row_to_objective(row),
        )?;
        Ok(objective)
    }

    /// Objectives of a subject, ordered by code.
    pub fn forge_objectives(&self, subject_id: &str) -> Result<Vec<ForgeObjective>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OBJECTIVE_COLUMNS} FROM forge_objectives WHERE subject_id = ?1 ORDER BY code"
        ))?;
        let rows = stmt
            .query_map([subject_id], |row| row_to_objective(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Add a concept, optionally linked to objectives.
    pub fn forge_add_concept(&self, input: ConceptInput) -> Result<ForgeConcept> {
        if input.term.trim().is_empty() || input.definition.trim().is_empty() {
            return Err(StoreError::Validation(
                "concept term and definition are required".into(),
            ));
        }
        let difficulty = match &input.difficulty {
            Some(d) => Difficulty::parse_name(d)
                .ok_or_else(|| StoreError::Validation(format!("unknown difficulty '{d}'")))?,
            None => Difficulty::default(),
        };
        let bloom = match &input.bloom_level {
            Some(b) => BloomLevel::parse_name(b)
                .ok_or_else(|| StoreError::Validation(format!("unknown bloom_level '{b}'")))?,
            None => BloomLevel::default(),
        };
        for objective_id in &input.objective_ids {
            let exists: bool = {
                let conn = self.read()?;
                conn.query_row(
                    "SELECT COUNT(*) FROM forge_objectives WHERE id = ?1",
                    [objective_id],
                    |row| row.get::<_, i64>(0),
                )? > 0
            };
            if !exists {
                return Err(StoreError::NotFound(format!("objective {objective_id}")));
            }
        }

        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO forge_concepts
                 (id, term, definition, category, difficulty, bloom_level, tags, subject_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    input.term,
                    input.definition,
                    input.category.unwrap_or_else(|| "general".into()),
                    difficulty.as_str(),
                    bloom.as_str(),
                    serde_json::to_string(&input.tags).unwrap_or_else(|_| "[]".into()),
                    input.subject_id.unwrap_or_default(),
                    now_iso(),
                ],
            )?;
            for objective_id in &input.objective_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO forge_concept_objectives (concept_id, objective_id)
                     VALUES (?1, ?2)",
                    params![id, objective_id],
                )?;
            }
        }

        self.bump_streak_today(0, 1, 0)?;
        self.forge_get_concept(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    /// Link an existing concept to an objective (idempotent).
    pub fn forge_link_objective(&self, concept_id: &str, objective_id: &str) -> Result<()> {
        if self.forge_get_concept(concept_id)?.is_none() {
            return Err(StoreError::NotFound(format!("concept {concept_id}")));
        }
        let conn = self.write()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_objectives WHERE id = ?1",
            [objective_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::NotFound(format!("objective {objective_id}")));
        }
        conn.execute(
            "INSERT OR IGNORE INTO forge_concept_objectives (concept_id, objective_id) VALUES (?1, ?2)",
            params![concept_id, objective_id],
        )?;
        Ok(())
    }

    /// Fetch a concept by id.
    pub fn forge_get_concept(&self, id: &str) -> Result<Option<ForgeConcept>> {
        let conn = self.read()?;
        let concept = conn
            .query_row(
                &format!("SELECT {CONCEPT_COLUMNS} FROM forge_concepts WHERE id = ?1"),
                [id],
                |row| row_to_concept(row),
            )
            .optional()?;
        Ok(concept)
    }

    /// Record a review. Mastery moves by the v2 table when correctness is
    /// explicit, otherwise by the v1 outcome table; the next review date
    /// depends only on the post-review mastery band.
    pub fn forge_record_review(&self, input: ReviewInput) -> Result<ReviewRecorded> {
        let outcome = ReviewOutcome::parse_name(&input.outcome)
            .ok_or_else(|| StoreError::Validation(format!("unknown outcome '{}'", input.outcome)))?;
        if !(1..=5).contains(&input.confidence) {
            return Err(StoreError::Validation(format!(
                "confidence must be in [1, 5], got {}",
                input.confidence
            )));
        }
        let concept = self
            .forge_get_concept(&input.concept_id)?
            .ok_or_else(|| StoreError::NotFound(format!("concept {}", input.concept_id)))?;

        let delta = match input.was_correct {
            Some(correct) => mastery_delta_v2(correct, input.confidence),
            None => mastery_delta_v1(outcome, input.confidence),
        };
        let new_mastery = (concept.mastery_level + delta).clamp(0.0, 1.0);

        let error_kind = input.was_correct.and_then(|correct| {
            classify_error(
                correct,
                input.confidence,
                concept.mastery_level,
                concept.correct_count,
                concept.review_count,
            )
        });

        let counts_as_correct = match input.was_correct {
            Some(correct) => correct,
            None => outcome == ReviewOutcome::Understood,
        };

        let now = Utc::now();
        let next_review = now + Duration::days(next_interval_days(new_mastery));
        let notes = input.notes.clone().unwrap_or_default();

        {
            let conn = self.write()?;
            conn.execute(
                "UPDATE forge_concepts
                 SET mastery_level = ?1, review_count = review_count + 1,
                     correct_count = correct_count + ?2, last_reviewed = ?3, next_review = ?4
                 WHERE id = ?5",
                params![
                    new_mastery,
                    counts_as_correct as i64,
                    now.to_rfc3339(),
                    next_review.to_rfc3339(),
                    concept.id,
                ],
            )?;
            conn.execute(
                "INSERT INTO forge_reviews (concept_id, outcome, confidence, was_correct, notes, subject_id, reviewed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    concept.id,
                    outcome.as_str(),
                    input.confidence,
                    input.was_correct.map(|b| b as i64),
                    notes,
                    concept.subject_id,
                    now.to_rfc3339(),
                ],
            )?;
            if let Some(kind) = error_kind {
                conn.execute(
                    "INSERT INTO forge_error_patterns
                     (concept_id, error_type, confidence, mastery_at_error, notes, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        concept.id,
                        kind.as_str(),
                        input.confidence,
                        concept.mastery_level,
                        notes,
                        now.to_rfc3339(),
                    ],
                )?;
            }
        }

        self.bump_streak_today(1, 0, input.time_spent_seconds.unwrap_or(0))?;

        let concept = self
            .forge_get_concept(&input.concept_id)?
            .ok_or_else(|| StoreError::NotFound(input.concept_id.clone()))?;
        Ok(ReviewRecorded {
            mastery_delta: delta,
            error_type: error_kind.map(|k| k.as_str().to_string()),
            next_review,
            concept,
        })
    }

    /// Deck-wide statistics.
    pub fn forge_stats(&self) -> Result<ForgeStats> {
        let now = Utc::now().to_rfc3339();
        let conn = self.read()?;

        let total_concepts: i64 =
            conn.query_row("SELECT COUNT(*) FROM forge_concepts", [], |r| r.get(0))?;
        let avg_mastery: f64 = conn.query_row(
            "SELECT COALESCE(AVG(mastery_level), 0.0) FROM forge_concepts",
            [],
            |r| r.get(0),
        )?;
        let due_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE next_review IS NOT NULL AND next_review <= ?1",
            [&now],
            |r| r.get(0),
        )?;
        let new_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE review_count = 0",
            [],
            |r| r.get(0),
        )?;
        let struggling_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE mastery_level < ?1 AND review_count > 0",
            [scoring::STRUGGLING_MASTERY],
            |r| r.get(0),
        )?;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let reviews_today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_reviews WHERE reviewed_at >= ?1",
            [format!("{today}T00:00:00")],
            |r| r.get(0),
        )?;

        let mut stmt =
            conn.prepare("SELECT date FROM forge_streaks WHERE concepts_reviewed > 0")?;
        let dates: Vec<NaiveDate> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
            .collect();
        drop(stmt);
        let (current_streak, longest_streak) =
            scoring::calculate_streaks(&dates, Utc::now().date_naive());

        Ok(ForgeStats {
            total_concepts,
            avg_mastery,
            due_count,
            new_count,
            struggling_count,
            reviews_today,
            current_streak,
            longest_streak,
        })
    }

    /// Per-category mastery aggregates.
    pub fn forge_knowledge_map(&self) -> Result<Vec<CategorySummary>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*), AVG(mastery_level),
                    SUM(CASE WHEN mastery_level < ?1 AND review_count > 0 THEN 1 ELSE 0 END)
             FROM forge_concepts GROUP BY category ORDER BY category",
        )?;
        let rows = stmt
            .query_map([scoring::STRUGGLING_MASTERY], |row| {
                Ok(CategorySummary {
                    category: row.get(0)?,
                    concept_count: row.get(1)?,
                    avg_mastery: row.get(2)?,
                    struggling_count: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Recent error patterns, grouped by type.
    pub fn forge_error_analysis(&self, limit: usize) -> Result<ErrorAnalysis> {
        let conn = self.read()?;
        let mut by_type = std::collections::BTreeMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT error_type, COUNT(*) FROM forge_error_patterns GROUP BY error_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (error_type, count) = row?;
                by_type.insert(error_type, count);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT e.concept_id, c.term, e.error_type, e.confidence, e.mastery_at_error, e.notes, e.created_at
             FROM forge_error_patterns e
             JOIN forge_concepts c ON c.id = e.concept_id
             ORDER BY e.created_at DESC LIMIT ?1",
        )?;
        let recent = stmt
            .query_map([limit as i64], |row| {
                Ok(ErrorPatternRow {
                    concept_id: row.get(0)?,
                    term: row.get(1)?,
                    error_type: row.get(2)?,
                    confidence: row.get(3)?,
                    mastery_at_error: row.get(4)?,
                    notes: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ErrorAnalysis { by_type, recent })
    }

    /// Upsert today's streak row.
    fn bump_streak_today(&self, reviewed: i64, added: i64, seconds: i64) -> Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let conn = self.write()?;
        conn.execute(
            "INSERT INTO forge_streaks (date, concepts_reviewed, concepts_added, time_spent_seconds)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                 concepts_reviewed = concepts_reviewed + excluded.concepts_reviewed,
                 concepts_added = concepts_added + excluded.concepts_added,
                 time_spent_seconds = time_spent_seconds + excluded.time_spent_seconds",
            params![today, reviewed, added, seconds],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
