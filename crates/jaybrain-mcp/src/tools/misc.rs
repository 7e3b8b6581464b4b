//! Personality, Onboarding & Profile Tools

use serde::Deserialize;
use serde_json::{json, Value};

use jaybrain_core::personality::PersonalityUpdate;

use super::{domain_error, parse_args, store_result, ToolCtx, ToolError, ToolResult};
use crate::protocol::messages::ToolDescription;

pub fn tools() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(
            "personality_get",
            "Read the assistant's personality settings.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "personality_set",
            "Update personality settings; omitted fields keep their values.",
            json!({
                "type": "object",
                "properties": {
                    "tone": {"type": "string"},
                    "verbosity": {"type": "string"},
                    "humor": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "proactivity": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "custom_instructions": {"type": "string"}
                }
            }),
        ),
        ToolDescription::new(
            "onboarding_status",
            "Onboarding progress: completed and remaining steps.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDescription::new(
            "onboarding_complete_step",
            "Mark an onboarding step complete. Completing a step twice is a conflict, not an error.",
            json!({
                "type": "object",
                "properties": {
                    "step": {"type": "string"}
                },
                "required": ["step"]
            }),
        ),
        ToolDescription::new(
            "profile_get",
            "Read the profile, or one dotted key of it.",
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Dotted key like job_search.target_role"}
                }
            }),
        ),
        ToolDescription::new(
            "profile_update",
            "Set a dotted profile key, creating intermediate maps.",
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string"},
                    "value": {}
                },
                "required": ["key", "value"]
            }),
        ),
    ]
}

pub fn call(name: &str, ctx: &ToolCtx, args: Option<Value>) -> Option<ToolResult> {
    match name {
        "personality_get" => Some(store_result(ctx.store.personality_get())),
        "personality_set" => Some(personality_set(ctx, args)),
        "onboarding_status" => Some(store_result(ctx.store.onboarding_status())),
        "onboarding_complete_step" => Some(complete_step(ctx, args)),
        "profile_get" => Some(profile_get(ctx, args)),
        "profile_update" => Some(profile_update(ctx, args)),
        _ => None,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

fn personality_set(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let update: PersonalityUpdate = parse_args(args)?;
    store_result(ctx.store.personality_set(update))
}

#[derive(Deserialize)]
struct StepArgs {
    step: String,
}

fn complete_step(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: StepArgs = parse_args(args)?;
    store_result(ctx.store.onboarding_complete_step(&args.step))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ProfileGetArgs {
    key: Option<String>,
}

fn profile_get(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ProfileGetArgs = parse_args(args)?;
    let profile = jaybrain_core::profile::load_profile(&ctx.config.profile_path())
        .map_err(|e| ToolError::Internal(e.to_string()))?;

    let yaml_value = match args.key {
        Some(key) => match jaybrain_core::profile::get_profile_key(&profile, &key) {
            Some(value) => value.clone(),
            None => return Ok(domain_error(format!("Profile key not found: {key}"))),
        },
        None => profile,
    };
    serde_json::to_value(&yaml_value).map_err(|e| ToolError::Internal(e.to_string()))
}

#[derive(Deserialize)]
struct ProfileUpdateArgs {
    key: String,
    value: Value,
}

fn profile_update(ctx: &ToolCtx, args: Option<Value>) -> ToolResult {
    let args: ProfileUpdateArgs = parse_args(args)?;
    // JSON values convert losslessly into YAML values
    let yaml_value = serde_yaml::to_value(&args.value)
        .map_err(|e| ToolError::InvalidArgs(format!("unrepresentable value: {e}")))?;
    let profile =
        jaybrain_core::profile::update_profile(&ctx.config.profile_path(), &args.key, yaml_value);
    match profile {
        Ok(updated) => {
            serde_json::to_value(&updated).map_err(|e| ToolError::Internal(e.to_string()))
        }
        Err(jaybrain_core::StoreError::Validation(msg)) => Err(ToolError::InvalidArgs(msg)),
        Err(e) => Err(ToolError::Internal(e.to_string())),
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
    fn test_personality_roundtrip() {
        let (ctx, _dir) = test_ctx();
        let initial = call("personality_get", &ctx, None).unwrap().unwrap();
        assert_eq!(initial["tone"], "direct");

        let updated = call("personality_set", &ctx, Some(json!({"humor": 0.8})))
            .unwrap()
            .unwrap();
        assert_eq!(updated["humor"], 0.8);
        assert_eq!(updated["tone"], "direct");
    }

    #[test]
    fn test_onboarding_conflict_is_data() {
        let (ctx, _dir) = test_ctx();
        call(
            "onboarding_complete_step",
            &ctx,
            Some(json!({"step": "profile"})),
        )
        .unwrap()
        .unwrap();
        let again = call(
            "onboarding_complete_step",
            &ctx,
            Some(json!({"step": "profile"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(again["status"], "already_completed");
    }

    #[test]
    fn test_profile_dotted_update_and_get() {
        let (ctx, _dir) = test_ctx();
        call(
            "profile_update",
            &ctx,
            Some(json!({"key": "job_search.target_role", "value": "SRE"})),
        )
        .unwrap()
        .unwrap();

        let value = call(
            "profile_get",
            &ctx,
            Some(json!({"key": "job_search.target_role"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(value, json!("SRE"));
    }

    #[test]
    fn test_profile_unknown_key_is_data() {
        let (ctx, _dir) = test_ctx();
        let result = call("profile_get", &ctx, Some(json!({"key": "no.such.key"})))
            .unwrap()
            .unwrap();
        assert!(result["error"].is_string());
    }
}
