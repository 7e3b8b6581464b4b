//! Forge Tools
//!
//! The spaced-repetition surface: subjects, objectives, concepts, reviews,
//! queues, readiness, calibration, and the error analysis views.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::{ConceptInput, ReviewInput};

use super::{parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "forge_add_subject",
            "Create an exam subject with a pass score.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "exam_date": {"type": "string", "description": "YYYY-MM-DD"},
                    "pass_score": {"type": "number", "default": 0.8, "minimum": 0.0, "maximum": 1.0},
                    "description": {"type": "string", "default": ""}
                },
                "required": ["name"]
            }),
        ),
        ToolDescription::new(
            "forge_add_objective",
            "Add a weighted syllabus objective (e.g. code '1.1') to a subject.",
            json!({
                "type": "object",
                "properties": {
                    "subject_id": {"type": "string"},
                    "code": {"type": "string"},
                    "title": {"type": "string"},
                    "domain": {"type": "string", "default": ""},
                    "exam_weight": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                },
                "required": ["subject_id", "code", "title", "exam_weight"]
            }),
        ),
        ToolDescription::new(
            "forge_add_concept",
            "Add a study concept, optionally linked to objectives.",
            json!({
                "type": "object",
                "properties": {
                    "term": {"type": "string"},
                    "definition": {"type": "string"},
                    "category": {"type": "string", "default": "general"},
                    "difficulty": {"type": "string", "enum": ["beginner", "intermediate", "advanced"]},
                    "bloom_level": {"type": "string", "enum": ["remember", "understand", "apply", "analyze"]},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "subject_id": {"type": "string"},
                    "objective_ids": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["term", "definition"]
            }),
        ),
        ToolDescription::new(
            "forge_link_objective",
            "Link an existing concept to an objective (idempotent).",
            json!({
                "type": "object",
                "properties": {
                    "concept_id": {"type": "string"},
                    "objective_id": {"type": "string"}
                },
                "required": ["concept_id", "objective_id"]
            }),
        ),
        ToolDescription::new(
            "forge_record_review",
            "Record a review. With was_correct the two-axis v2 scoring applies; without it the outcome-driven v1 table. The next review date follows the post-review mastery band.",
            json!({
                "type": "object",
                "properties": {
                    "concept_id": {"type": "string"},
                    "outcome": {"type": "string", "enum": ["understood", "reviewed", "struggled", "skipped"]},
                    "confidence": {"type": "integer", "minimum": 1, "maximum": 5},
                    "was_correct": {"type": "boolean"},
                    "notes": {"type": "string"},
                    "time_spent_seconds": {"type": "integer", "minimum": 0}
                },
                "required": ["concept_id", "outcome", "confidence"]
            }),
        ),
        ToolDescription::new(
            "forge_study_queue",
            "The study queue. With subject_id: the interleaved queue ordered by exam weight and mastery gap. Without: the four buckets (due, struggling, new, up next).",
            json!({
                "type": "object",
                "properties": {
                    "subject_id": {"type": "string"},
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 100}
                }
            }),
        ),
        ToolDescription::new(
            "forge_stats",
            "Deck statistics: totals, due/new/struggling counts, reviews today, streaks.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "forge_readiness",
            "Per-subject readiness: coverage and exam-weight-weighted mastery per domain.",
            json!({
                "type": "object",
                "properties": {
                    "subject_id": {"type": "string"}
                },
                "required": ["subject_id"]
            }),
        ),
        ToolDescription::new(
            "forge_calibration",
            "Confidence-vs-correctness cross-tab over v2 reviews, with the overconfidence rate.",
            json!({
                "type": "object",
                "properties": {
                    "subject_id": {"type": "string"}
                }
            }),
        ),
        ToolDescription::new(
            "forge_knowledge_map",
            "Per-category mastery aggregates across the deck.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "forge_error_analysis",
            "Recent error patterns (slip/lapse/mistake/misconception) grouped by type.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 100}
                }
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "forge_add_subject" => Some(add_subject(ctx, args)),
        "forge_add_objective" => Some(add_objective(ctx, args)),
        "forge_add_concept" => Some(add_concept(ctx, args)),
        "forge_link_objective" => Some(link_objective(ctx, args)),
        "forge_record_review" => Some(record_review(ctx, args)),
        "forge_study_queue" => Some(study_queue(ctx, args)),
        "forge_stats" => Some(store_result(ctx.store.forge_stats())),
        "forge_readiness" => Some(readiness(ctx, args)),
        "forge_calibration" => Some(calibration(ctx, args)),
        "forge_knowledge_map" => Some(store_result(ctx.store.forge_knowledge_map())),
        "forge_error_analysis" => Some(error_analysis(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Deserialize)]
struct SubjectArgs {
    name: String,
    exam_date: Option<String>,
    pass_score: Option<f64>,
    #[serde(default)]
    description: String,
}

fn add_subject(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: SubjectArgs = parse_args(args)?;
    store_result(ctx.store.forge_add_subject(
        &args.name,
        args.exam_date.as_deref(),
        args.pass_score.unwrap_or(0.8),
        &args.description,
    ))
}

#[derive(Deserialize)]
struct ObjectiveArgs {
    subject_id: String,
    code: String,
    title: String,
    #[serde(default)]
    domain: String,
    exam_weight: f64,
}

fn add_objective(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ObjectiveArgs = parse_args(args)?;
    store_result(ctx.store.forge_add_objective(
        &args.subject_id,
        &args.code,
        &args.title,
        &args.domain,
        args.exam_weight,
    ))
}

fn add_concept(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let input: ConceptInput = parse_args(args)?;
    store_result(ctx.store.forge_add_concept(input))
}

#[derive(Deserialize)]
struct LinkArgs {
    concept_id: String,
    objective_id: String,
}

fn link_objective(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: LinkArgs = parse_args(args)?;
    store_result(
        ctx.store
            .forge_link_objective(&args.concept_id, &args.objective_id)
            .map(|()| json!({ "status": "linked" })),
    )
}

fn record_review(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let input: ReviewInput = parse_args(args)?;
    store_result(ctx.store.forge_record_review(input))
}

#[derive(Deserialize)]
struct QueueArgs {
    subject_id: Option<String>,
    limit: Option<usize>,
}

fn study_queue(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: QueueArgs = parse_args(args)?;
    let limit = args.limit.unwrap_or(20);
    match args.subject_id {
        Some(subject_id) => {
            let items = store_result(ctx.store.forge_interleaved_queue(&subject_id, limit))?;
            Ok(json!({
                "mode": "interleaved",
                "subject_id": subject_id,
                "total": items.as_array().map(|a| a.len()).unwrap_or(0),
                "items": items,
            }))
        }
        None => {
            let queue = store_result(ctx.store.forge_study_queue(limit))?;
            Ok(json!({ "mode": "buckets", "queue": queue }))
        }
    }
}

#[derive(Deserialize)]
struct ReadinessArgs {
    subject_id: String,
}

fn readiness(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ReadinessArgs = parse_args(args)?;
    store_result(ctx.store.forge_readiness(&args.subject_id))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CalibrationArgs {
    subject_id: Option<String>,
}

fn calibration(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: CalibrationArgs = parse_args(args)?;
    store_result(ctx.store.forge_calibration(args.subject_id.as_deref()))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorAnalysisArgs {
    limit: Option<usize>,
}

fn error_analysis(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ErrorAnalysisArgs = parse_args(args)?;
    store_result(ctx.store.forge_error_analysis(args.limit.unwrap_or(20)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;

    /// Subject with weighted objectives and three linked concepts
    fn seed(ctx: &ToolCtx) -> (String, Vec<String>) {
        let subject = call(
            "forge_add_subject",
            ctx,
            Some(json!({"name": "Test Exam", "pass_score": 0.80})),
        )
        .unwrap()
        .unwrap();
        let subject_id = subject["id"].as_str().unwrap().to_string();

        let obj1 = call(
            "forge_add_objective",
            ctx,
            Some(json!({
                "subject_id": subject_id, "code": "1.1", "title": "Topic A",
                "domain": "Domain 1", "exam_weight": 0.60
            })),
        )
        .unwrap()
        .unwrap();
        let obj2 = call(
            "forge_add_objective",
            ctx,
            Some(json!({
                "subject_id": subject_id, "code": "2.1", "title": "Topic B",
                "domain": "Domain 2", "exam_weight": 0.40
            })),
        )
        .unwrap()
        .unwrap();

        let mut concept_ids = Vec::new();
        for (term, obj) in [("alpha", &obj1), ("beta", &obj1), ("gamma", &obj2)] {
            let concept = call(
                "forge_add_concept",
                ctx,
                Some(json!({
                    "term": term,
                    "definition": format!("definition of {term}"),
                    "subject_id": subject_id,
                    "objective_ids": [obj["id"].as_str().unwrap()]
                })),
            )
            .unwrap()
            .unwrap();
            concept_ids.push(concept["id"].as_str().unwrap().to_string());
        }
        (subject_id, concept_ids)
    }

    #[test]
    fn test_study_loop_scenario() {
        let (ctx, _dir) = test_ctx();
        let (subject_id, concept_ids) = seed(&ctx);

        for id in &concept_ids {
            let recorded = call(
                "forge_record_review",
                &ctx,
                Some(json!({
                    "concept_id": id, "outcome": "understood",
                    "confidence": 5, "was_correct": true
                })),
            )
            .unwrap()
            .unwrap();
            let mastery = recorded["concept"]["masteryLevel"].as_f64().unwrap();
            assert!((mastery - 0.20).abs() < 1e-9);
        }

        let readiness = call(
            "forge_readiness",
            &ctx,
            Some(json!({"subject_id": subject_id})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(readiness["coverage"], 1.0);
        assert!((readiness["avgMastery"].as_f64().unwrap() - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_interleaved_queue_prefers_heavier_domain() {
        let (ctx, _dir) = test_ctx();
        let (subject_id, _) = seed(&ctx);

        let queue = call(
            "forge_study_queue",
            &ctx,
            Some(json!({"subject_id": subject_id})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(queue["mode"], "interleaved");
        assert_eq!(queue["items"][0]["examWeight"], 0.60);
    }

    #[test]
    fn test_bucket_queue_without_subject() {
        let (ctx, _dir) = test_ctx();
        seed(&ctx);
        let queue = call("forge_study_queue", &ctx, None).unwrap().unwrap();
        assert_eq!(queue["mode"], "buckets");
        assert_eq!(queue["queue"]["newConcepts"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_review_unknown_concept_is_domain_error() {
        let (ctx, _dir) = test_ctx();
        let result = call(
            "forge_record_review",
            &ctx,
            Some(json!({"concept_id": "000000000000", "outcome": "understood", "confidence": 3})),
        )
        .unwrap()
        .unwrap();
        assert!(result["error"].is_string());
    }

    #[test]
    fn test_calibration_after_reviews() {
        let (ctx, _dir) = test_ctx();
        let (subject_id, concept_ids) = seed(&ctx);
        call(
            "forge_record_review",
            &ctx,
            Some(json!({
                "concept_id": concept_ids[0], "outcome": "struggled",
                "confidence": 4, "was_correct": false
            })),
        )
        .unwrap()
        .unwrap();

        let cal = call(
            "forge_calibration",
            &ctx,
            Some(json!({"subject_id": subject_id})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(cal["confidentIncorrect"], 1);
        assert_eq!(cal["overconfidenceRate"], 1.0);
    }
}
