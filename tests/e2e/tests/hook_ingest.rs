//! Hook ingest: SessionStart + 50 tool uses + SessionEnd, replayed through
//! the raw JSON entry point, then read back via the pulse query.

use jaybrain_e2e_tests::test_env;
use jaybrain_core::hooks::handle_raw;
use jaybrain_core::pulse::{query_session, SessionQuery};

#[test]
fn session_lifecycle_through_raw_events() {
    let (store, _config, dir) = test_env();
    let db = dir.path().join("jaybrain.store");

    handle_raw(
        &db,
        &serde_json::json!({
            "hook_event_name": "SessionStart",
            "session_id": "s1",
            "cwd": "/proj"
        })
        .to_string(),
    )
    .unwrap();

    for i in 0..50 {
        handle_raw(
            &db,
            &serde_json::json!({
                "hook_event_name": "PostToolUse",
                "session_id": "s1",
                "cwd": "/proj",
                "tool_name": "Read",
                "tool_input": {"file_path": format!("/proj/file_{i}.rs")}
            })
            .to_string(),
        )
        .unwrap();
    }

    handle_raw(
        &db,
        &serde_json::json!({
            "hook_event_name": "SessionEnd",
            "session_id": "s1"
        })
        .to_string(),
    )
    .unwrap();

    match query_session(&store, "s1").unwrap() {
        SessionQuery::Ok {
            session,
            tool_usage,
        } => {
            assert_eq!(session.status, "ended");
            assert_eq!(session.tool_count, 50);
            assert_eq!(tool_usage.get("Read"), Some(&50));
        }
        other => panic!("expected ok, got {other:?}"),
    }
}

#[test]
fn empty_and_malformed_input_behaviour() {
    let (_store, _config, dir) = test_env();
    let db = dir.path().join("jaybrain.store");

    // Empty input is a clean no-op
    handle_raw(&db, "").unwrap();
    handle_raw(&db, "   \n").unwrap();

    // Garbage is an error the hook binary swallows to stderr
    assert!(handle_raw(&db, "not json").is_err());
}

#[test]
fn precompact_checkpoints_the_session() {
    let (store, _config, dir) = test_env();
    let db = dir.path().join("jaybrain.store");

    handle_raw(
        &db,
        &serde_json::json!({
            "hook_event_name": "PreCompact",
            "session_id": "sess-pc",
            "cwd": "/proj"
        })
        .to_string(),
    )
    .unwrap();

    let session = store.get_session("sess-pc").unwrap().unwrap();
    assert!(session.checkpoint_at.is_some());
    assert!(session
        .checkpoint_summary
        .unwrap()
        .contains("PreCompact triggered"));
}
