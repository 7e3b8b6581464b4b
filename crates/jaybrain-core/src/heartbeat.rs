//! Heartbeat Checks
//!
//! Proactive condition evaluators run by the daemon. Each check gathers
//! state, decides whether to speak up, pushes through
//! [`dispatch_notification`] (which rate-limits per check), and always
//! leaves a `heartbeat_log` row behind.

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::forge::scoring::{calculate_streaks, STRUGGLING_MASTERY};
use crate::notify::Notifier;
use crate::storage::{now_iso, Result, Store};

// ============================================================================
// RATE LIMITS
// ============================================================================

/// Per-check rate-limit window in hours; unknown checks get the default.
pub fn rate_limit_hours(check_name: &str) -> i64 {
    match check_name {
        "forge_study_morning" => 20,
        "forge_study_evening" => 20,
        "exam_countdown" => 22,
        "stale_applications" => 22,
        "session_crash" => 2,
        "goal_staleness" => 160, // ~weekly
        "time_allocation" => 160,
        "network_decay" => 160,
        _ => 12,
    }
}

/// Heartbeat window after which an active assistant session counts as
/// stalled
const SESSION_STALL_MINUTES: i64 = 30;

/// Goals untouched this long are stale
const GOAL_STALE_WEEKS: i64 = 2;

/// Exam countdown stays quiet further out than this
const EXAM_COUNTDOWN_DAYS: i64 = 14;

// ============================================================================
// TYPES
// ============================================================================

/// Outcome of one check run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub check_name: String,
    pub triggered: bool,
    pub message: String,
    pub notified: bool,
    /// Check-specific context for the tool surface
    pub context: serde_json::Value,
}

impl CheckOutcome {
    fn quiet(check_name: &str, message: &str) -> Self {
        Self {
            check_name: check_name.into(),
            triggered: false,
            message: message.into(),
            notified: false,
            context: json!({}),
        }
    }
}

// ============================================================================
// DISPATCH + LOG
// ============================================================================

/// Whether this check already notified inside its rate-limit window.
fn was_recently_notified(store: &Store, check_name: &str) -> Result<bool> {
    let cutoff =
        (Utc::now() - Duration::hours(rate_limit_hours(check_name))).to_rfc3339();
    let conn = store.read()?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM heartbeat_log
         WHERE check_name = ?1 AND notified = 1 AND checked_at > ?2",
        params![check_name, cutoff],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record a check outcome.
fn log_check(store: &Store, check_name: &str, triggered: bool, message: &str, notified: bool) {
    let result = store.write().and_then(|conn| {
        conn.execute(
            "INSERT INTO heartbeat_log (check_name, triggered, message, notified, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![check_name, triggered as i64, message, notified as i64, now_iso()],
        )?;
        Ok(())
    });
    if let Err(e) = result {
        tracing::error!("Failed to log heartbeat check {}: {}", check_name, e);
    }
}

/// Send a notification unless the check is rate-limited. Suppressed sends
/// are still logged as triggered-but-not-notified. Returns whether the
/// message went out.
pub fn dispatch_notification(
    store: &Store,
    notifier: &dyn Notifier,
    check_name: &str,
    message: &str,
) -> bool {
    if was_recently_notified(store, check_name).unwrap_or(false) {
        log_check(store, check_name, true, message, false);
        return false;
    }
    match notifier.send_chunked(message) {
        Ok(()) => {
            log_check(store, check_name, true, message, true);
            true
        }
        Err(e) => {
            tracing::error!("Failed to send heartbeat notification: {}", e);
            log_check(store, check_name, true, message, false);
            false
        }
    }
}

// ============================================================================
// CHECKS
// ============================================================================

/// Morning study check: due counts, streak status, exam proximity.
pub fn check_forge_study_morning(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<CheckOutcome> {
    check_forge_study(store, notifier, config, "forge_study_morning", true)
}

/// Evening study check: streak-at-risk language.
pub fn check_forge_study_evening(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<CheckOutcome> {
    check_forge_study(store, notifier, config, "forge_study_evening", false)
}

fn check_forge_study(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
    check_name: &str,
    morning: bool,
) -> Result<CheckOutcome> {
    let now = Utc::now();
    let now_iso_str = now.to_rfc3339();
    let today = now.date_naive();

    let (due_count, new_count, struggling_count, streak_dates) = {
        let conn = store.read()?;
        let due: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE next_review IS NOT NULL AND next_review <= ?1",
            [&now_iso_str],
            |r| r.get(0),
        )?;
        let new: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE review_count = 0",
            [],
            |r| r.get(0),
        )?;
        let struggling: i64 = conn.query_row(
            "SELECT COUNT(*) FROM forge_concepts WHERE mastery_level < ?1 AND review_count > 0",
            [STRUGGLING_MASTERY],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT date FROM forge_streaks WHERE concepts_reviewed > 0
             ORDER BY date DESC LIMIT 60",
        )?;
        let dates: Vec<NaiveDate> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
            .collect();
        (due, new, struggling, dates)
    };

    let studied_today = streak_dates.first() == Some(&today);
    let (streak, _) = calculate_streaks(&streak_dates, today);
    let days_to_exam = days_to_exam(config);

    // Adaptive threshold: in the final week any due item matters
    let mut threshold = config.forge_due_threshold;
    if matches!(days_to_exam, Some(d) if d <= 7) {
        threshold = 1;
    }

    let context = json!({
        "due_count": due_count,
        "new_count": new_count,
        "struggling_count": struggling_count,
        "studied_today": studied_today,
        "streak": streak,
        "days_to_exam": days_to_exam,
    });

    if due_count < threshold && studied_today {
        log_check(store, check_name, false, "No action needed", false);
        return Ok(CheckOutcome {
            check_name: check_name.into(),
            triggered: false,
            message: "No action needed".into(),
            notified: false,
            context,
        });
    }

    let mut parts: Vec<String> = Vec::new();
    if morning {
        if let Some(days) = days_to_exam {
            if days <= 7 {
                parts.push(format!("[{days}d to exam]"));
            }
        }
        let mut queue_parts = Vec::new();
        if due_count > 0 {
            queue_parts.push(format!("{due_count} due"));
        }
        if struggling_count > 0 {
            queue_parts.push(format!("{struggling_count} struggling"));
        }
        if new_count > 0 {
            queue_parts.push(format!("{new_count} new"));
        }
        if !queue_parts.is_empty() {
            parts.push(format!("Study queue: {}.", queue_parts.join(", ")));
        }
        if studied_today {
            if streak >= 3 {
                parts.push(format!("Streak: {streak} days, keep it going."));
            }
        } else if streak > 0 {
            parts.push(format!("{streak}-day streak at risk, study today to keep it."));
        } else {
            parts.push("Start a new streak today.".into());
        }
    } else if !studied_today {
        if streak > 0 {
            parts.push(format!("No study today, {streak}-day streak expires at midnight."));
        } else {
            parts.push("No study today. A quick 10-minute session starts a streak.".into());
        }
        if due_count > 0 {
            parts.push(format!("{due_count} concepts waiting for review."));
        }
    }

    let message = parts.join(" ");
    let notified = if !parts.is_empty() {
        dispatch_notification(store, notifier, check_name, &message)
    } else {
        log_check(store, check_name, false, "No action needed", false);
        false
    };

    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: !parts.is_empty(),
        message,
        notified,
        context,
    })
}

/// Exam countdown: fires only within 14 days of the configured date.
pub fn check_exam_countdown(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<CheckOutcome> {
    let check_name = "exam_countdown";
    let Some(days_left) = days_to_exam(config) else {
        log_check(store, check_name, false, "No exam date configured", false);
        return Ok(CheckOutcome::quiet(check_name, "No exam date configured"));
    };

    if days_left > EXAM_COUNTDOWN_DAYS {
        let message = format!("{days_left} days left (>14, no alert)");
        log_check(store, check_name, false, &message, false);
        return Ok(CheckOutcome::quiet(check_name, &message));
    }

    let avg_mastery: f64 = {
        let conn = store.read()?;
        conn.query_row(
            "SELECT COALESCE(AVG(mastery_level), 0.0) FROM forge_concepts WHERE subject_id != ''",
            [],
            |r| r.get(0),
        )?
    };

    let mut message = format!(
        "Exam in {days_left} days! Current average mastery: {:.0}%. ",
        avg_mastery * 100.0
    );
    if days_left <= 3 {
        message.push_str("Final stretch, focus on weak areas.");
    } else if days_left <= 7 {
        message.push_str("One week out. Review flagged concepts.");
    }

    let notified = dispatch_notification(store, notifier, check_name, &message);
    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: true,
        message,
        notified,
        context: json!({ "days_left": days_left, "avg_mastery": avg_mastery }),
    })
}

/// Applications sitting in `applied` past the follow-up window.
pub fn check_stale_applications(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<CheckOutcome> {
    let check_name = "stale_applications";
    let cutoff = (Utc::now() - Duration::days(config.app_stale_days)).to_rfc3339();

    let stale: Vec<(String, String)> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(
            "SELECT j.company, j.title
             FROM applications a JOIN job_postings j ON j.id = a.job_id
             WHERE a.status = 'applied' AND a.applied_date IS NOT NULL AND a.applied_date < ?1",
        )?;
        stmt.query_map([&cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect()
    };

    if stale.is_empty() {
        log_check(store, check_name, false, "No stale applications", false);
        return Ok(CheckOutcome::quiet(check_name, "No stale applications"));
    }

    let mut lines = vec![format!("{} application(s) need follow-up:", stale.len())];
    for (company, title) in stale.iter().take(5) {
        lines.push(format!("  - {company}: {title}"));
    }
    let message = lines.join("\n");
    let notified = dispatch_notification(store, notifier, check_name, &message);
    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: true,
        message,
        notified,
        context: json!({ "stale_count": stale.len() }),
    })
}

/// Active assistant sessions with a silent heartbeat.
pub fn check_session_crash(store: &Store, notifier: &dyn Notifier) -> Result<CheckOutcome> {
    let check_name = "session_crash";
    let cutoff = (Utc::now() - Duration::minutes(SESSION_STALL_MINUTES)).to_rfc3339();

    let stalled: Vec<(String, String, i64)> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, cwd, tool_count FROM claude_sessions
             WHERE status = 'active' AND last_heartbeat < ?1",
        )?;
        stmt.query_map([&cutoff], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect()
    };

    if stalled.is_empty() {
        log_check(store, check_name, false, "No stalled sessions", false);
        return Ok(CheckOutcome::quiet(check_name, "No stalled sessions"));
    }

    let mut lines = vec![format!("{} stalled session(s) detected:", stalled.len())];
    for (session_id, cwd, tool_count) in stalled.iter().take(3) {
        let short = session_id.chars().take(12).collect::<String>();
        lines.push(format!("  - {short}... ({tool_count} tools, cwd: {cwd})"));
    }
    let message = lines.join("\n");
    let notified = dispatch_notification(store, notifier, check_name, &message);
    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: true,
        message,
        notified,
        context: json!({ "stalled_count": stalled.len() }),
    })
}

/// Active goals with no progress updates in two weeks.
pub fn check_goal_staleness(store: &Store, notifier: &dyn Notifier) -> Result<CheckOutcome> {
    let check_name = "goal_staleness";
    let cutoff = Utc::now() - Duration::weeks(GOAL_STALE_WEEKS);
    let stale = store.stale_goals(cutoff)?;

    if stale.is_empty() {
        log_check(store, check_name, false, "No stale goals", false);
        return Ok(CheckOutcome::quiet(check_name, "No stale goals"));
    }

    let mut lines = vec![format!(
        "{} goal(s) haven't been updated in {GOAL_STALE_WEEKS}+ weeks:",
        stale.len()
    )];
    for (goal, domain) in stale.iter().take(5) {
        lines.push(format!(
            "  - [{domain}] {} ({:.0}%)",
            goal.title,
            goal.progress * 100.0
        ));
    }
    let message = lines.join("\n");
    let notified = dispatch_notification(store, notifier, check_name, &message);
    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: true,
        message,
        notified,
        context: json!({ "stale_count": stale.len() }),
    })
}

/// Active boards whose last check is older than a week. The actual fetch is
/// an external scraper's job; this check just points at neglected boards.
pub fn check_job_board_staleness(store: &Store, notifier: &dyn Notifier) -> Result<CheckOutcome> {
    let check_name = "job_board_autofetch";
    let cutoff = (Utc::now() - Duration::days(7)).to_rfc3339();

    let neglected: Vec<String> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM job_boards
             WHERE active = 1 AND (last_checked IS NULL OR last_checked < ?1)",
        )?;
        stmt.query_map([&cutoff], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect()
    };

    if neglected.is_empty() {
        log_check(store, check_name, false, "All boards fresh", false);
        return Ok(CheckOutcome::quiet(check_name, "All boards fresh"));
    }

    let message = format!(
        "{} job board(s) unchecked for a week: {}",
        neglected.len(),
        neglected.join(", ")
    );
    let notified = dispatch_notification(store, notifier, check_name, &message);
    Ok(CheckOutcome {
        check_name: check_name.into(),
        triggered: true,
        message,
        notified,
        context: json!({ "board_count": neglected.len() }),
    })
}

/// Run one check by name. Unknown names return a structured error value.
pub fn run_single_check(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
    check_name: &str,
) -> Result<serde_json::Value> {
    let outcome = match check_name {
        "forge_study" | "forge_study_morning" => {
            check_forge_study_morning(store, notifier, config)?
        }
        "forge_study_evening" => check_forge_study_evening(store, notifier, config)?,
        "exam_countdown" => check_exam_countdown(store, notifier, config)?,
        "stale_applications" => check_stale_applications(store, notifier, config)?,
        "session_crash" => check_session_crash(store, notifier)?,
        "goal_staleness" => check_goal_staleness(store, notifier)?,
        "job_board_autofetch" => check_job_board_staleness(store, notifier)?,
        "time_allocation" => {
            return crate::time_allocation::check_time_allocation(store, notifier, config)
                .map(|o| serde_json::to_value(o).unwrap_or_default());
        }
        "network_decay" => {
            return crate::network_decay::check_network_decay(store, notifier)
                .map(|o| serde_json::to_value(o).unwrap_or_default());
        }
        other => {
            return Ok(json!({ "error": format!("Unknown check: {other}") }));
        }
    };
    Ok(serde_json::to_value(outcome).unwrap_or_default())
}

/// Recent heartbeat history: the latest outcome per check plus a short log.
pub fn heartbeat_status(store: &Store) -> Result<serde_json::Value> {
    let conn = store.read()?;
    let mut stmt = conn.prepare(
        "SELECT check_name, triggered, message, notified, checked_at
         FROM heartbeat_log ORDER BY checked_at DESC LIMIT 20",
    )?;
    let rows: Vec<(String, i64, String, i64, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut latest = serde_json::Map::new();
    for (name, triggered, message, notified, at) in &rows {
        if !latest.contains_key(name) {
            latest.insert(
                name.clone(),
                json!({
                    "last_checked": at,
                    "last_triggered": *triggered != 0,
                    "last_notified": *notified != 0,
                    "last_message": message,
                }),
            );
        }
    }

    let recent: Vec<serde_json::Value> = rows
        .iter()
        .take(10)
        .map(|(name, triggered, message, notified, at)| {
            json!({
                "check": name,
                "triggered": *triggered != 0,
                "notified": *notified != 0,
                "message": message.chars().take(100).collect::<String>(),
                "at": at,
            })
        })
        .collect();

    Ok(json!({ "checks": latest, "recent_log": recent }))
}

fn days_to_exam(config: &Config) -> Option<i64> {
    let exam = config.exam_date?;
    let days = (exam - Utc::now().date_naive()).num_days();
    if days >= 0 { Some(days) } else { None }
}

// ============================================================================
// TESTS
// ============================================================================
