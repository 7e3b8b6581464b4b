//! Transcript Parsing
//!
//! The assistant host persists per-session JSONL transcripts. This parser
//! extracts the conversational turns and filters the noise: progress lines,
//! file-history snapshots, tool-only turns, and streaming duplicates. Used
//! by both the pulse session-context reader and the conversation archiver.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// TYPES
// ============================================================================

/// One conversational turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// "user" or "assistant"
    pub role: String,
    pub text: String,
}

/// A parsed transcript
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub turns: Vec<Turn>,
    /// tool_name -> use count, tallied from assistant tool_use blocks
    pub tool_counts: std::collections::BTreeMap<String, i64>,
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a transcript file. IO errors bubble; malformed lines are skipped.
pub fn parse_file(path: &Path) -> std::io::Result<Transcript> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_lines(&contents))
}

/// Parse transcript JSONL content.
pub fn parse_lines(contents: &str) -> Transcript {
    let mut transcript = Transcript::default();
    // requestId -> index into turns, for streaming last-write-wins
    let mut request_index: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "progress" | "file-history-snapshot" => continue,
            "user" => {
                if let Some(text) = user_text(&event) {
                    transcript.turns.push(Turn {
                        role: "user".into(),
                        text,
                    });
                }
            }
            "assistant" => {
                tally_tool_uses(&event, &mut transcript.tool_counts);
                let Some(text) = assistant_text(&event) else {
                    continue;
                };
                let request_id = event
                    .get("requestId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match request_id.and_then(|id| {
                    let existing = request_index.get(&id).copied();
                    if existing.is_none() {
                        request_index.insert(id, transcript.turns.len());
                    }
                    existing
                }) {
                    // Streaming repeat: keep only the last text for the id
                    Some(index) => transcript.turns[index].text = text,
                    None => transcript.turns.push(Turn {
                        role: "assistant".into(),
                        text,
                    }),
                }
            }
            _ => continue,
        }
    }

    transcript
}

/// A user turn is text iff `message.content` is a non-blank string, or a
/// list containing at least one text block. Tool-result-only turns filter
/// out here.
fn user_text(event: &Value) -> Option<String> {
    let content = event.get("message")?.get("content")?;
    match content {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Array(blocks) => collect_text_blocks(blocks),
        _ => None,
    }
}

/// An assistant turn is text iff its content list has at least one text
/// block; thinking and tool_use blocks alone don't qualify.
fn assistant_text(event: &Value) -> Option<String> {
    let blocks = event.get("message")?.get("content")?.as_array()?;
    collect_text_blocks(blocks)
}

fn collect_text_blocks(blocks: &[Value]) -> Option<String> {
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .filter(|t| !t.trim().is_empty())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n").trim().to_string())
    }
}

fn tally_tool_uses(event: &Value, counts: &mut std::collections::BTreeMap<String, i64>) {
    let Some(blocks) = event
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return;
    };
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("tool_use") {
            if let Some(name) = block.get("name").and_then(Value::as_str) {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }
}

/// Truncate a turn for display, marking the cut.
pub fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}…")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(value: Value) -> String {
        serde_json::to_string(&value).unwrap()
    }

    #[test]
    fn test_plain_user_and_assistant_turns() {
        let content = [
            line(serde_json::json!({
                "type": "user",
                "message": {"role": "user", "content": "hello there"}
            })),
            line(serde_json::json!({
                "type": "assistant",
                "message": {"content": [{"type": "text", "text": "hi!"}]}
            })),
        ]
        .join("\n");

        let transcript = parse_lines(&content);
        assert_eq!(transcript.turns.len(), 2);
        assert_eq!(transcript.turns[0].role, "user");
        assert_eq!(transcript.turns[0].text, "hello there");
        assert_eq!(transcript.turns[1].role, "assistant");
    }

    #[test]
    fn test_noise_lines_skipped() {
        let content = [
            line(serde_json::json!({"type": "progress", "data": {}})),
            line(serde_json::json!({"type": "file-history-snapshot", "snapshot": {}})),
            "not even json".to_string(),
            line(serde_json::json!({
                "type": "user",
                "message": {"content": "real turn"}
            })),
        ]
        .join("\n");

        let transcript = parse_lines(&content);
        assert_eq!(transcript.turns.len(), 1);
    }

    #[test]
    fn test_tool_result_only_user_turn_filtered() {
        let content = line(serde_json::json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "x", "content": "output"}
            ]}
        }));
        let transcript = parse_lines(&content);
        assert!(transcript.turns.is_empty());
    }

    #[test]
    fn test_thinking_and_tool_use_only_assistant_filtered() {
        let content = line(serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "tool_use", "name": "Read", "input": {}}
            ]}
        }));
        let transcript = parse_lines(&content);
        assert!(transcript.turns.is_empty());
        // But the tool use is tallied
        assert_eq!(transcript.tool_counts.get("Read"), Some(&1));
    }

    #[test]
    fn test_streaming_request_id_keeps_last_text() {
        let content = [
            line(serde_json::json!({
                "type": "assistant",
                "requestId": "req-1",
                "message": {"content": [{"type": "text", "text": "partial"}]}
            })),
            line(serde_json::json!({
                "type": "assistant",
                "requestId": "req-1",
                "message": {"content": [{"type": "text", "text": "partial plus more"}]}
            })),
        ]
        .join("\n");

        let transcript = parse_lines(&content);
        assert_eq!(transcript.turns.len(), 1);
        assert_eq!(transcript.turns[0].text, "partial plus more");
    }

    #[test]
    fn test_blank_user_string_filtered() {
        let content = line(serde_json::json!({
            "type": "user",
            "message": {"content": "   "}
        }));
        assert!(parse_lines(&content).turns.is_empty());
    }

    #[test]
    fn test_clip_marks_truncation() {
        let text = "a".repeat(900);
        let clipped = clip(&text, 800);
        assert_eq!(clipped.chars().count(), 801);
        assert!(clipped.ends_with('…'));
        assert_eq!(clip("short", 800), "short");
    }
}
