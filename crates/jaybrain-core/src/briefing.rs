//! Daily Briefing
//!
//! The 07:00 digest: due and queued tasks, the study queue, yesterday's
//! sessions, and fresh articles, assembled under the notification
//! transport's message budget.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::notify::{Notifier, MESSAGE_BUDGET};
use crate::storage::{Result, Store};

// ============================================================================
// TYPES
// ============================================================================

/// Assembled briefing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Briefing {
    pub message: String,
    pub sections: usize,
}

// ============================================================================
// COMPOSITION
// ============================================================================

/// Build the briefing text, always within the transport budget.
pub fn compose_briefing(store: &Store, config: &Config) -> Result<Briefing> {
    let mut sections: Vec<String> = Vec::new();
    let today = Utc::now().format("%Y-%m-%d").to_string();

    sections.push(format!("Good morning. Briefing for {today}."));

    if let Some(exam) = config.exam_date {
        let days = (exam - Utc::now().date_naive()).num_days();
        if (0..=30).contains(&days) {
            sections.push(format!("Exam in {days} days."));
        }
    }

    // Work queue
    let queue = store.queue_view()?;
    if !queue.is_empty() {
        let mut lines = vec![format!("Queue ({}):", queue.len())];
        for task in queue.iter().take(5) {
            lines.push(format!("  {}. {}", task.queue_position.unwrap_or(0), task.title));
        }
        sections.push(lines.join("\n"));
    }

    // Tasks due today or overdue
    let due_tasks: Vec<String> = store
        .task_list(None, None, 100)?
        .into_iter()
        .filter(|t| {
            t.status != "done"
                && t.status != "cancelled"
                && t.due_date
                    .as_deref()
                    .map(|d| d <= today.as_str())
                    .unwrap_or(false)
        })
        .map(|t| format!("  - {} [{}]", t.title, t.priority))
        .collect();
    if !due_tasks.is_empty() {
        sections.push(format!("Due today:\n{}", due_tasks.join("\n")));
    }

    // Study queue
    let stats = store.forge_stats()?;
    if stats.due_count > 0 || stats.new_count > 0 {
        let mut parts = Vec::new();
        if stats.due_count > 0 {
            parts.push(format!("{} due", stats.due_count));
        }
        if stats.new_count > 0 {
            parts.push(format!("{} new", stats.new_count));
        }
        if stats.current_streak > 0 {
            parts.push(format!("{}-day streak", stats.current_streak));
        }
        sections.push(format!("Study: {}.", parts.join(", ")));
    }

    // Yesterday's sessions
    let yesterday_cutoff = Utc::now() - Duration::hours(24);
    let recent: Vec<String> = store
        .recent_sessions(10)?
        .into_iter()
        .filter(|s| s.started_at >= yesterday_cutoff && !s.title.is_empty())
        .map(|s| format!("  - {}", s.title))
        .collect();
    if !recent.is_empty() {
        sections.push(format!("Yesterday's sessions:\n{}", recent.join("\n")));
    }

    // Fresh articles
    let articles = store.recent_articles(&yesterday_cutoff.to_rfc3339(), 5)?;
    if !articles.is_empty() {
        let lines: Vec<String> = articles
            .iter()
            .map(|(title, _url)| format!("  - {title}"))
            .collect();
        sections.push(format!("New articles:\n{}", lines.join("\n")));
    }

    let section_count = sections.len();
    let mut message = sections.join("\n\n");

    // Stay under the transport budget; the formatter owns this, not the
    // chunker
    if message.chars().count() > MESSAGE_BUDGET {
        message = message.chars().take(MESSAGE_BUDGET - 20).collect();
        message.push_str("\n…(truncated)");
    }

    Ok(Briefing {
        message,
        sections: section_count,
    })
}

/// Compose and send the briefing.
pub fn send_daily_briefing(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<Briefing> {
    let briefing = compose_briefing(store, config)?;
    crate::heartbeat::dispatch_notification(store, notifier, "daily_briefing", &briefing.message);
    Ok(briefing)
}

// ============================================================================
// TESTS
// ============================================================================
