//! Job-Search Tools
//!
//! Postings, boards, applications, and interview prep.

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::PostingInput;

use super::{domain_error, parse_args, store_result, ToolCtx, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "jobs_add",
            "Record a discovered job posting.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "company": {"type": "string"},
                    "url": {"type": "string"},
                    "description": {"type": "string"},
                    "required_skills": {"type": "array", "items": {"type": "string"}},
                    "preferred_skills": {"type": "array", "items": {"type": "string"}},
                    "salary_min": {"type": "integer"},
                    "salary_max": {"type": "integer"},
                    "work_mode": {"type": "string", "description": "remote, hybrid, onsite"},
                    "location": {"type": "string"},
                    "board_id": {"type": "string"}
                },
                "required": ["title", "company"]
            }),
        ),
        ToolDescription::new(
            "jobs_search",
            "Keyword search over postings (title, company, description).",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 20, "minimum": 1, "maximum": 100}
                },
                "required": ["query"]
            }),
        ),
        ToolDescription::new(
            "application_create",
            "Create an application for a posting. One per posting; repeats return the existing one.",
            json!({
                "type": "object",
                "properties": {
                    "job_id": {"type": "string"}
                },
                "required": ["job_id"]
            }),
        ),
        ToolDescription::new(
            "application_update",
            "Update an application. Moving to 'applied' stamps the date.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "status": {"type": "string", "enum": ["discovered", "preparing", "ready", "applied", "interviewing", "offered", "accepted", "rejected", "withdrawn"]},
                    "resume_path": {"type": "string"},
                    "cover_letter_path": {"type": "string"},
                    "notes": {"type": "string"}
                },
                "required": ["id"]
            }),
        ),
        ToolDescription::new(
            "application_list",
            "List applications, optionally filtered by status.",
            json!({
                "type": "object",
                "properties": {
                    "status": {"type": "string"}
                }
            }),
        ),
        ToolDescription::new(
            "board_add",
            "Register a job board to watch.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "url": {"type": "string"},
                    "board_type": {"type": "string", "default": "listing"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["name", "url"]
            }),
        ),
        ToolDescription::new(
            "board_list",
            "List registered boards.",
            json!({
                "type": "object",
                "properties": {
                    "active_only": {"type": "boolean", "default": false}
                }
            }),
        ),
        ToolDescription::new(
            "interview_prep_save",
            "Save (upsert) interview prep for an application.",
            json!({
                "type": "object",
                "properties": {
                    "application_id": {"type": "string"},
                    "company_research": {"type": "string", "default": ""},
                    "questions": {"type": "array", "items": {"type": "string"}},
                    "answers": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["application_id"]
            }),
        ),
        ToolDescription::new(
            "interview_prep_get",
            "Fetch interview prep for an application.",
            json!({
                "type": "object",
                "properties": {
                    "application_id": {"type": "string"}
                },
                "required": ["application_id"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "jobs_add" => Some(jobs_add(ctx, args)),
        "jobs_search" => Some(jobs_search(ctx, args)),
        "application_create" => Some(application_create(ctx, args)),
        "application_update" => Some(application_update(ctx, args)),
        "application_list" => Some(application_list(ctx, args)),
        "board_add" => Some(board_add(ctx, args)),
        "board_list" => Some(board_list(ctx, args)),
        "interview_prep_save" => Some(prep_save(ctx, args)),
        "interview_prep_get" => Some(prep_get(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

fn jobs_add(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let input: PostingInput = parse_args(args)?;
    store_result(ctx.store.jobs_add(input))
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    limit: Option<usize>,
}

fn jobs_search(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let postings = store_result(ctx.store.jobs_search(&args.query, args.limit.unwrap_or(20)))?;
    Ok(json!({
        "total": postings.as_array().map(|a| a.len()).unwrap_or(0),
        "postings": postings,
    }))
}

#[derive(Deserialize)]
struct AppCreateArgs {
    job_id: String,
}

fn application_create(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: AppCreateArgs = parse_args(args)?;
    let (status, app) = match ctx.store.application_create(&args.job_id) {
        Ok(pair) => pair,
        Err(jaybrain_core::StoreError::NotFound(what)) => {
            return Ok(domain_error(format!("Not found: {what}")));
        }
        Err(e) => return Err(super::ToolError::Internal(e.to_string())),
    };
    Ok(json!({
        "status": status,
        "application": app,
    }))
}

#[derive(Deserialize)]
struct AppUpdateArgs {
    id: String,
    status: Option<String>,
    resume_path: Option<String>,
    cover_letter_path: Option<String>,
    notes: Option<String>,
}

fn application_update(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: AppUpdateArgs = parse_args(args)?;
    let updated = store_result(ctx.store.application_update(
        &args.id,
        args.status.as_deref(),
        args.resume_path.as_deref(),
        args.cover_letter_path.as_deref(),
        args.notes.as_deref(),
    ))?;
    if updated.is_null() {
        Ok(domain_error(format!("Application not found: {}", args.id)))
    } else {
        Ok(updated)
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AppListArgs {
    status: Option<String>,
}

fn application_list(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: AppListArgs = parse_args(args)?;
    let apps = store_result(ctx.store.application_list(args.status.as_deref()))?;
    Ok(json!({
        "total": apps.as_array().map(|a| a.len()).unwrap_or(0),
        "applications": apps,
    }))
}

#[derive(Deserialize)]
struct BoardAddArgs {
    name: String,
    url: String,
    #[serde(default)]
    board_type: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn board_add(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: BoardAddArgs = parse_args(args)?;
    store_result(
        ctx.store
            .board_add(&args.name, &args.url, &args.board_type, &args.tags),
    )
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BoardListArgs {
    active_only: bool,
}

fn board_list(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: BoardListArgs = parse_args(args)?;
    let boards = store_result(ctx.store.board_list(args.active_only))?;
    Ok(json!({
        "total": boards.as_array().map(|a| a.len()).unwrap_or(0),
        "boards": boards,
    }))
}

#[derive(Deserialize)]
struct PrepSaveArgs {
    application_id: String,
    #[serde(default)]
    company_research: String,
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    answers: Vec<String>,
}

fn prep_save(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: PrepSaveArgs = parse_args(args)?;
    store_result(ctx.store.interview_prep_save(
        &args.application_id,
        &args.company_research,
        &args.questions,
        &args.answers,
    ))
}

#[derive(Deserialize)]
struct PrepGetArgs {
    application_id: String,
}

fn prep_get(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: PrepGetArgs = parse_args(args)?;
    let prep = store_result(ctx.store.interview_prep_get(&args.application_id))?;
    if prep.is_null() {
        Ok(domain_error(format!(
            "No interview prep for application {}",
            args.application_id
        )))
    } else {
        Ok(prep)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_ctx;

    #[test]
    fn test_posting_application_pipeline() {
        let (ctx, _dir) = test_ctx();
        let posting = call(
            "jobs_add",
            &ctx,
            Some(json!({"title": "Platform Engineer", "company": "Acme"})),
        )
        .unwrap()
        .unwrap();
        let job_id = posting["id"].as_str().unwrap();

        let created = call("application_create", &ctx, Some(json!({"job_id": job_id})))
            .unwrap()
            .unwrap();
        assert_eq!(created["status"], "created");

        // Idempotent second create
        let again = call("application_create", &ctx, Some(json!({"job_id": job_id})))
            .unwrap()
            .unwrap();
        assert_eq!(again["status"], "already_exists");

        let app_id = created["application"]["id"].as_str().unwrap();
        let updated = call(
            "application_update",
            &ctx,
            Some(json!({"id": app_id, "status": "applied"})),
        )
        .unwrap()
        .unwrap();
        assert!(updated["appliedDate"].is_string());

        let listed = call("application_list", &ctx, Some(json!({"status": "applied"})))
            .unwrap()
            .unwrap();
        assert_eq!(listed["total"], 1);
    }

    #[test]
    fn test_interview_prep_roundtrip() {
        let (ctx, _dir) = test_ctx();
        let posting = call(
            "jobs_add",
            &ctx,
            Some(json!({"title": "SRE", "company": "Acme"})),
        )
        .unwrap()
        .unwrap();
        let created = call(
            "application_create",
            &ctx,
            Some(json!({"job_id": posting["id"].as_str().unwrap()})),
        )
        .unwrap()
        .unwrap();
        let app_id = created["application"]["id"].as_str().unwrap();

        call(
            "interview_prep_save",
            &ctx,
            Some(json!({"application_id": app_id, "questions": ["Why Acme?"]})),
        )
        .unwrap()
        .unwrap();

        let prep = call(
            "interview_prep_get",
            &ctx,
            Some(json!({"application_id": app_id})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(prep["questions"][0], "Why Acme?");
    }

    #[test]
    fn test_application_for_unknown_posting() {
        let (ctx, _dir) = test_ctx();
        let result = call(
            "application_create",
            &ctx,
            Some(json!({"job_id": "000000000000"})),
        )
        .unwrap()
        .unwrap();
        assert!(result["error"].is_string());
    }
}
