//! Study Queue, Readiness & Calibration
//!
//! Two queues coexist: the v1 bucket view (no subject) and the v2
//! interleaved queue that orders concepts by objective exam weight and
//! mastery gap. Readiness and calibration aggregate the same tables.

use chrono::{Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use super::scoring::{CONFIDENT_THRESHOLD, STRUGGLING_MASTERY};
use super::{row_to_concept, ForgeConcept, CONCEPT_COLUMNS};
use crate::storage::{Result, Store, StoreError};

/// How far ahead the `up_next` bucket looks
const UP_NEXT_WINDOW_DAYS: i64 = 3;

/// Mastery ceiling for `up_next` (above this the concept can wait)
const UP_NEXT_MASTERY_CEILING: f64 = 0.8;

// ============================================================================
// TYPES
// ============================================================================

/// v1 queue: four disjoint buckets, priority due > struggling > new > up_next
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyQueue {
    pub due_now: Vec<ForgeConcept>,
    pub struggling: Vec<ForgeConcept>,
    pub new_concepts: Vec<ForgeConcept>,
    pub up_next: Vec<ForgeConcept>,
}

/// One slot of the v2 interleaved queue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub concept: ForgeConcept,
    pub objective_code: String,
    pub exam_weight: f64,
}

/// Per-domain readiness
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReadiness {
    pub domain: String,
    pub exam_weight: f64,
    pub concept_count: i64,
    pub reviewed_count: i64,
    pub avg_mastery: f64,
}

/// Per-subject readiness rollup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub subject_id: String,
    pub total_concepts: i64,
    pub reviewed_concepts: i64,
    /// reviewed / total, 0.0 on an empty deck
    pub coverage: f64,
    /// exam-weight-weighted average mastery across domains
    pub avg_mastery: f64,
    pub pass_score: f64,
    pub per_domain: Vec<DomainReadiness>,
}

/// Confidence-vs-correctness cross-tabulation over v2 reviews
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub confident_correct: i64,
    pub confident_incorrect: i64,
    pub unsure_correct: i64,
    pub unsure_incorrect: i64,
    /// confident_incorrect / (confident_correct + confident_incorrect)
    pub overconfidence_rate: f64,
    /// (confident_correct + unsure_incorrect) / total
    pub calibration_score: f64,
}

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// v1 study queue: four disjoint buckets, each concept in at most one.
    pub fn forge_study_queue(&self, limit: usize) -> Result<StudyQueue> {
        let limit = limit.clamp(1, 100);
        let now = Utc::now();
        let now_iso = now.to_rfc3339();
        let horizon = (now + Duration::days(UP_NEXT_WINDOW_DAYS)).to_rfc3339();

        let conn = self.read()?;
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        let mut fetch =
            |sql: &str, args: Vec<rusqlite::types::Value>| -> Result<Vec<ForgeConcept>> {
                let mut stmt = conn.prepare(sql)?;
                let rows: Vec<ForgeConcept> = stmt
                    .query_map(rusqlite::params_from_iter(args), |row| row_to_concept(row))?
                    .filter_map(|r| r.ok())
                    .collect();
                Ok(rows
                    .into_iter()
                    .filter(|c| seen.insert(c.id.clone()))
                    .take(limit)
                    .collect())
            };

        use rusqlite::types::Value as Sql;
        let due_now = fetch(
            &format!(
                "SELECT {CONCEPT_COLUMNS} FROM forge_concepts
                 WHERE next_review IS NOT NULL AND next_review <= ?1
                 ORDER BY next_review"
            ),
            vec![Sql::Text(now_iso.clone())],
        )?;
        let struggling = fetch(
            &format!(
                "SELECT {CONCEPT_COLUMNS} FROM forge_concepts
                 WHERE mastery_level < ?1 AND review_count >= 2
                 ORDER BY mastery_level"
            ),
            vec![Sql::Real(STRUGGLING_MASTERY)],
        )?;
        let new_concepts = fetch(
            &format!(
                "SELECT {CONCEPT_COLUMNS} FROM forge_concepts
                 WHERE review_count = 0 ORDER BY created_at"
            ),
            vec![],
        )?;
        let up_next = fetch(
            &format!(
                "SELECT {CONCEPT_COLUMNS} FROM forge_concepts
                 WHERE next_review IS NOT NULL AND next_review > ?1 AND next_review <= ?2
                   AND mastery_level >= ?3 AND mastery_level < ?4
                 ORDER BY next_review"
            ),
            vec![
                Sql::Text(now_iso),
                Sql::Text(horizon),
                Sql::Real(STRUGGLING_MASTERY),
                Sql::Real(UP_NEXT_MASTERY_CEILING),
            ],
        )?;

        Ok(StudyQueue {
            due_now,
            struggling,
            new_concepts,
            up_next,
        })
    }

    /// v2 interleaved queue for a subject.
    ///
    /// Objectives rank by `exam_weight * (1 - avg_mastery)`; the queue
    /// round-robins across them, each objective yielding its most urgent
    /// concept (due first, then lowest mastery).
    pub fn forge_interleaved_queue(&self, subject_id: &str, limit: usize) -> Result<Vec<QueueItem>> {
        let limit = limit.clamp(1, 100);
        if self.forge_get_subject(subject_id)?.is_none() {
            return Err(StoreError::NotFound(format!("subject {subject_id}")));
        }

        let objectives = self.forge_objectives(subject_id)?;
        let now_iso = Utc::now().to_rfc3339();

        // Per-objective concept lists, most urgent first
        let mut lanes: Vec<(f64, String, f64, Vec<ForgeConcept>)> = Vec::new();
        {
            let conn = self.read()?;
            for objective in &objectives {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONCEPT_COLUMNS} FROM forge_concepts c
                     JOIN forge_concept_objectives co ON co.concept_id = c.id
                     WHERE co.objective_id = ?1
                     ORDER BY CASE WHEN c.next_review IS NOT NULL AND c.next_review <= ?2 THEN 0 ELSE 1 END,
                              c.mastery_level, c.created_at"
                ))?;
                let concepts: Vec<ForgeConcept> = stmt
                    .query_map(params![objective.id, now_iso], |row| row_to_concept(row))?
                    .filter_map(|r| r.ok())
                    .collect();
                if concepts.is_empty() {
                    continue;
                }
                let avg_mastery: f64 = concepts.iter().map(|c| c.mastery_level).sum::<f64>()
                    / concepts.len() as f64;
                let priority = objective.exam_weight * (1.0 - avg_mastery);
                lanes.push((priority, objective.code.clone(), objective.exam_weight, concepts));
            }
        }

        // Heavier, weaker domains first
        lanes.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut queue = Vec::new();
        let mut cursors: Vec<usize> = vec![0; lanes.len()];
        let mut queued: std::collections::HashSet<String> = std::collections::HashSet::new();
        while queue.len() < limit {
            let mut progressed = false;
            for (lane_idx, (_, code, weight, concepts)) in lanes.iter().enumerate() {
                if queue.len() >= limit {
                    break;
                }
                // A concept linked to several objectives appears once
                while cursors[lane_idx] < concepts.len() {
                    let concept = &concepts[cursors[lane_idx]];
                    cursors[lane_idx] += 1;
                    if queued.insert(concept.id.clone()) {
                        queue.push(QueueItem {
                            concept: concept.clone(),
                            objective_code: code.clone(),
                            exam_weight: *weight,
                        });
                        progressed = true;
                        break;
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(queue)
    }

    /// Per-subject readiness: coverage plus exam-weight-weighted mastery.
    pub fn forge_readiness(&self, subject_id: &str) -> Result<Readiness> {
        let subject = self
            .forge_get_subject(subject_id)?
            .ok_or_else(|| StoreError::NotFound(format!("subject {subject_id}")))?;
        let objectives = self.forge_objectives(subject_id)?;

        let mut per_domain: Vec<DomainReadiness> = Vec::new();
        let mut domain_index: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();
        let mut counted: std::collections::HashSet<String> = std::collections::HashSet::new();
        let (mut total, mut reviewed) = (0i64, 0i64);

        {
            let conn = self.read()?;
            for objective in &objectives {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONCEPT_COLUMNS} FROM forge_concepts c
                     JOIN forge_concept_objectives co ON co.concept_id = c.id
                     WHERE co.objective_id = ?1"
                ))?;
                let concepts: Vec<ForgeConcept> = stmt
                    .query_map([&objective.id], |row| row_to_concept(row))?
                    .filter_map(|r| r.ok())
                    .collect();

                let entry_idx = *domain_index
                    .entry(objective.domain.clone())
                    .or_insert_with(|| {
                        per_domain.push(DomainReadiness {
                            domain: objective.domain.clone(),
                            exam_weight: 0.0,
                            concept_count: 0,
                            reviewed_count: 0,
                            avg_mastery: 0.0,
                        });
                        per_domain.len() - 1
                    });
                let entry = &mut per_domain[entry_idx];
                entry.exam_weight += objective.exam_weight;

                for concept in &concepts {
                    // avg_mastery accumulates as a sum; divided below
                    entry.concept_count += 1;
                    entry.avg_mastery += concept.mastery_level;
                    if concept.review_count > 0 {
                        entry.reviewed_count += 1;
                    }
                    if counted.insert(concept.id.clone()) {
                        total += 1;
                        if concept.review_count > 0 {
                            reviewed += 1;
                        }
                    }
                }
            }
        }

        for entry in &mut per_domain {
            if entry.concept_count > 0 {
                entry.avg_mastery /= entry.concept_count as f64;
            }
        }

        let weight_sum: f64 = per_domain
            .iter()
            .filter(|d| d.concept_count > 0)
            .map(|d| d.exam_weight)
            .sum();
        let avg_mastery = if weight_sum > 0.0 {
            per_domain
                .iter()
                .filter(|d| d.concept_count > 0)
                .map(|d| d.exam_weight * d.avg_mastery)
                .sum::<f64>()
                / weight_sum
        } else {
            0.0
        };

        Ok(Readiness {
            subject_id: subject.id,
            total_concepts: total,
            reviewed_concepts: reviewed,
            coverage: if total > 0 {
                reviewed as f64 / total as f64
            } else {
                0.0
            },
            avg_mastery,
            pass_score: subject.pass_score,
            per_domain,
        })
    }

    /// Calibration over v2 reviews (rows with explicit correctness), scoped
    /// to a subject when given.
    pub fn forge_calibration(&self, subject_id: Option<&str>) -> Result<Calibration> {
        let conn = self.read()?;
        let (sql, args): (String, Vec<String>) = match subject_id {
            Some(id) => (
                "SELECT confidence, was_correct FROM forge_reviews
                 WHERE was_correct IS NOT NULL AND subject_id = ?1"
                    .into(),
                vec![id.to_string()],
            ),
            None => (
                "SELECT confidence, was_correct FROM forge_reviews WHERE was_correct IS NOT NULL"
                    .into(),
                vec![],
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut cal = Calibration {
            confident_correct: 0,
            confident_incorrect: 0,
            unsure_correct: 0,
            unsure_incorrect: 0,
            overconfidence_rate: 0.0,
            calibration_score: 0.0,
        };
        for (confidence, correct) in &rows {
            match (*confidence >= CONFIDENT_THRESHOLD, *correct == 1) {
                (true, true) => cal.confident_correct += 1,
                (true, false) => cal.confident_incorrect += 1,
                (false, true) => cal.unsure_correct += 1,
                (false, false) => cal.unsure_incorrect += 1,
            }
        }

        let confident = cal.confident_correct + cal.confident_incorrect;
        if confident > 0 {
            cal.overconfidence_rate = cal.confident_incorrect as f64 / confident as f64;
        }
        let total = rows.len() as i64;
        if total > 0 {
            cal.calibration_score =
                (cal.confident_correct + cal.unsure_incorrect) as f64 / total as f64;
        }
        Ok(cal)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::{ConceptInput, ReviewInput};
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    /// Subject with objectives "1.1" (0.60) and "2.1" (0.40), three concepts
    struct Fixture {
        subject_id: String,
        concept_ids: Vec<String>,
    }

    fn fixture(store: &Store) -> Fixture {
        let subject = store.forge_add_subject("Test Exam", None, 0.80, "").unwrap();
        let obj1 = store
            .forge_add_objective(&subject.id, "1.1", "Topic A", "Domain 1", 0.60)
            .unwrap();
        let obj2 = store
            .forge_add_objective(&subject.id, "2.1", "Topic B", "Domain 2", 0.40)
            .unwrap();

        let mut concept_ids = Vec::new();
        for (term, objective) in [("alpha", &obj1), ("beta", &obj1), ("gamma", &obj2)] {
            let concept = store
                .forge_add_concept(ConceptInput {
                    term: term.into(),
                    definition: format!("definition of {term}"),
                    subject_id: Some(subject.id.clone()),
                    objective_ids: vec![objective.id.clone()],
                    ..Default::default()
                })
                .unwrap();
            concept_ids.push(concept.id);
        }
        Fixture {
            subject_id: subject.id,
            concept_ids,
        }
    }

    fn review_correct(store: &Store, concept_id: &str) {
        store
            .forge_record_review(ReviewInput {
                concept_id: concept_id.to_string(),
                outcome: "understood".into(),
                confidence: 5,
                was_correct: Some(true),
                notes: None,
                time_spent_seconds: None,
            })
            .unwrap();
    }

    #[test]
    fn test_v1_queue_buckets_are_disjoint() {
        let (store, _dir) = test_store();
        let fx = fixture(&store);
        // One reviewed (becomes due tomorrow), two stay new
        review_correct(&store, &fx.concept_ids[0]);

        let queue = store.forge_study_queue(10).unwrap();
        assert_eq!(queue.new_concepts.len(), 2);

        let mut all: Vec<&str> = Vec::new();
        all.extend(queue.due_now.iter().map(|c| c.id.as_str()));
        all.extend(queue.struggling.iter().map(|c| c.id.as_str()));
        all.extend(queue.new_concepts.iter().map(|c| c.id.as_str()));
        all.extend(queue.up_next.iter().map(|c| c.id.as_str()));
        let unique: std::collections::HashSet<&&str> = all.iter().collect();
        assert_eq!(unique.len(), all.len(), "buckets overlap");
    }

    #[test]
    fn test_struggling_requires_review_history() {
        let (store, _dir) = test_store();
        let fx = fixture(&store);
        // Two wrong unsure answers: mastery stays < 0.3, review_count = 2
        for _ in 0..2 {
            store
                .forge_record_review(ReviewInput {
                    concept_id: fx.concept_ids[0].clone(),
                    outcome: "struggled".into(),
                    confidence: 2,
                    was_correct: Some(false),
                    notes: None,
                    time_spent_seconds: None,
                })
                .unwrap();
        }
        let queue = store.forge_study_queue(10).unwrap();
        // due_now has priority over struggling; the concept is due (1-day band)
        // so it lands in due_now, not struggling — buckets stay disjoint
        let in_due = queue.due_now.iter().any(|c| c.id == fx.concept_ids[0]);
        let in_struggling = queue.struggling.iter().any(|c| c.id == fx.concept_ids[0]);
        assert!(in_due ^ in_struggling);
    }

    #[test]
    fn test_interleaved_queue_orders_heavy_domain_first() {
        let (store, _dir) = test_store();
        let fx = fixture(&store);
        let items = store.forge_interleaved_queue(&fx.subject_id, 10).unwrap();
        assert_eq!(items.len(), 3);
        // Equal mastery: the 0.60-weight objective leads
        assert_eq!(items[0].exam_weight, 0.60);
        assert_eq!(items[0].objective_code, "1.1");
        // Round-robin: second slot comes from the other domain
        assert_eq!(items[1].objective_code, "2.1");
    }

    #[test]
    fn test_interleaved_queue_unknown_subject() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.forge_interleaved_queue("missing", 10),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_readiness_full_coverage_after_reviews() {
        let (store, _dir) = test_store();
        let fx = fixture(&store);
        for id in &fx.concept_ids {
            review_correct(&store, id);
        }

        let readiness = store.forge_readiness(&fx.subject_id).unwrap();
        assert_eq!(readiness.total_concepts, 3);
        assert_eq!(readiness.reviewed_concepts, 3);
        assert!((readiness.coverage - 1.0).abs() < 1e-9);
        // Every mastery is 0.20, so the weighted average is 0.20
        assert!((readiness.avg_mastery - 0.20).abs() < 1e-9);
        assert_eq!(readiness.per_domain.len(), 2);
        assert!((readiness.pass_score - 0.80).abs() < 1e-9);
    }

    #[test]
    fn test_readiness_empty_subject() {
        let (store, _dir) = test_store();
        let subject = store.forge_add_subject("Empty", None, 0.7, "").unwrap();
        let readiness = store.forge_readiness(&subject.id).unwrap();
        assert_eq!(readiness.total_concepts, 0);
        assert_eq!(readiness.coverage, 0.0);
        assert_eq!(readiness.avg_mastery, 0.0);
    }

    #[test]
    fn test_calibration_empty_is_zero() {
        let (store, _dir) = test_store();
        let cal = store.forge_calibration(None).unwrap();
        assert_eq!(cal.calibration_score, 0.0);
        assert_eq!(cal.overconfidence_rate, 0.0);
    }

    #[test]
    fn test_calibration_cross_tab() {
        let (store, _dir) = test_store();
        let fx = fixture(&store);
        // confident correct, confident correct, confident incorrect
        review_correct(&store, &fx.concept_ids[0]);
        review_correct(&store, &fx.concept_ids[1]);
        store
            .forge_record_review(ReviewInput {
                concept_id: fx.concept_ids[2].clone(),
                outcome: "struggled".into(),
                confidence: 4,
                was_correct: Some(false),
                notes: None,
                time_spent_seconds: None,
            })
            .unwrap();

        let cal = store.forge_calibration(Some(&fx.subject_id)).unwrap();
        assert_eq!(cal.confident_correct, 2);
        assert_eq!(cal.confident_incorrect, 1);
        assert!((cal.overconfidence_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!(cal.calibration_score > 0.0);
    }
}
