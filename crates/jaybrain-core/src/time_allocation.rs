//! Time Allocation
//!
//! Actual hours from the pulse activity log vs life-domain targets.
//! Wall-clock session time is unreliable (sessions left open show 49h+), so
//! active time is the sum of gaps between consecutive tool calls, capped at
//! the idle threshold.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::heartbeat::dispatch_notification;
use crate::notify::Notifier;
use crate::storage::{Result, Store};

// ============================================================================
// TYPES
// ============================================================================

/// One domain's actual-vs-target line
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAllocation {
    pub name: String,
    pub actual_hours: f64,
    pub target_hours: f64,
    /// actual / target as a percentage; 0 when untargeted
    pub pct: f64,
    /// "on_track", "under", "over", or "no_target"
    pub status: String,
}

/// The weekly comparison report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationReport {
    pub domains: Vec<DomainAllocation>,
    pub total_actual: f64,
    pub total_target: f64,
    pub period_days: i64,
    pub sessions_analyzed: i64,
}

/// Heartbeat outcome for the weekly drift check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationCheck {
    pub triggered: bool,
    pub message: String,
    pub report: AllocationReport,
}

// ============================================================================
// DERIVATION
// ============================================================================

/// Active hours for one session: sum of consecutive activity gaps at or
/// under the idle threshold. Fewer than two events means no measurable time.
pub fn session_active_hours(
    store: &Store,
    session_id: &str,
    idle_threshold_minutes: i64,
) -> Result<f64> {
    let timestamps: Vec<DateTime<Utc>> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp FROM session_activity_log
             WHERE session_id = ?1 ORDER BY timestamp ASC",
        )?;
        stmt.query_map([session_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect()
    };

    if timestamps.len() < 2 {
        return Ok(0.0);
    }

    let threshold = Duration::minutes(idle_threshold_minutes);
    let mut active_seconds = 0i64;
    for pair in timestamps.windows(2) {
        let gap = pair[1] - pair[0];
        if gap <= threshold {
            active_seconds += gap.num_seconds();
        }
    }
    Ok(active_seconds as f64 / 3600.0)
}

/// Map a working directory to a domain via the ordered substring table.
pub fn map_cwd_to_domain(cwd: &str, map: &[(String, String)]) -> String {
    let cwd_lower = cwd.to_lowercase();
    for (pattern, domain) in map {
        if cwd_lower.contains(&pattern.to_lowercase()) {
            return domain.clone();
        }
    }
    "Uncategorized".to_string()
}

/// Aggregate active hours per domain over the lookback window.
pub fn hours_by_domain(store: &Store, config: &Config) -> Result<(BTreeMap<String, f64>, i64)> {
    let cutoff = (Utc::now() - Duration::days(config.time_lookback_days)).to_rfc3339();
    let sessions: Vec<(String, String)> = {
        let conn = store.read()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, cwd FROM claude_sessions WHERE started_at >= ?1",
        )?;
        stmt.query_map([&cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect()
    };

    let mut domains: BTreeMap<String, f64> = BTreeMap::new();
    let mut analyzed = 0i64;
    for (session_id, cwd) in sessions {
        let hours = session_active_hours(store, &session_id, config.idle_threshold_minutes)?;
        if hours > 0.0 {
            let domain = map_cwd_to_domain(&cwd, &config.cwd_domain_map);
            *domains.entry(domain).or_default() += hours;
            analyzed += 1;
        }
    }
    Ok((domains, analyzed))
}

/// Compare derived hours against `life_domains.hours_per_week`, scaling
/// targets to the lookback window.
pub fn weekly_report(store: &Store, config: &Config) -> Result<AllocationReport> {
    let (actuals, sessions_analyzed) = hours_by_domain(store, config)?;

    let targets: BTreeMap<String, f64> = store
        .life_domains()?
        .into_iter()
        .filter(|d| d.hours_per_week > 0.0)
        .map(|d| (d.name, d.hours_per_week))
        .collect();

    let scale = config.time_lookback_days as f64 / 7.0;
    let mut names: std::collections::BTreeSet<String> = actuals.keys().cloned().collect();
    names.extend(targets.keys().cloned());

    let mut domains = Vec::new();
    for name in names {
        let actual = actuals.get(&name).copied().unwrap_or(0.0);
        let target = targets.get(&name).copied().unwrap_or(0.0) * scale;
        let (pct, status) = if target > 0.0 {
            let pct = actual / target * 100.0;
            let status = if pct < 50.0 {
                "under"
            } else if pct > 150.0 {
                "over"
            } else {
                "on_track"
            };
            (pct, status)
        } else {
            (0.0, "no_target")
        };
        domains.push(DomainAllocation {
            name,
            actual_hours: (actual * 10.0).round() / 10.0,
            target_hours: (target * 10.0).round() / 10.0,
            pct: pct.round(),
            status: status.to_string(),
        });
    }

    let total_actual: f64 = domains.iter().map(|d| d.actual_hours).sum();
    let total_target: f64 = domains.iter().map(|d| d.target_hours).sum();
    Ok(AllocationReport {
        domains,
        total_actual: (total_actual * 10.0).round() / 10.0,
        total_target: (total_target * 10.0).round() / 10.0,
        period_days: config.time_lookback_days,
        sessions_analyzed,
    })
}

/// Weekly heartbeat: notify when any targeted domain drifts under 50% or
/// over 150%.
pub fn check_time_allocation(
    store: &Store,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<AllocationCheck> {
    let report = weekly_report(store, config)?;

    let mut alerts = Vec::new();
    for d in &report.domains {
        match d.status.as_str() {
            "under" => alerts.push(format!(
                "  - {}: {}h / {}h ({:.0}%), under target",
                d.name, d.actual_hours, d.target_hours, d.pct
            )),
            "over" => alerts.push(format!(
                "  - {}: {}h / {}h ({:.0}%), over target",
                d.name, d.actual_hours, d.target_hours, d.pct
            )),
            _ => {}
        }
    }

    if alerts.is_empty() {
        return Ok(AllocationCheck {
            triggered: false,
            message: String::new(),
            report,
        });
    }

    let mut lines = vec![format!(
        "Time allocation drift detected ({}-day window):",
        report.period_days
    )];
    lines.extend(alerts);
    lines.push(format!(
        "\nTotal: {}h / {}h target",
        report.total_actual, report.total_target
    ));
    let message = lines.join("\n");
    dispatch_notification(store, notifier, "time_allocation", &message);

    Ok(AllocationCheck {
        triggered: true,
        message,
        report,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    fn config_with_map() -> Config {
        let mut config = Config::from_env();
        config.idle_threshold_minutes = 30;
        config.time_lookback_days = 7;
        config.cwd_domain_map = vec![
            ("jaybrain".into(), "Career".into()),
            ("homelab".into(), "Learning".into()),
        ];
        config
    }

    /// Insert a session with activity at the given minute offsets
    fn seed_session(store: &Store, session_id: &str, cwd: &str, minute_offsets: &[i64]) {
        let base = Utc::now() - Duration::hours(2);
        let conn = store.write().unwrap();
        conn.execute(
            "INSERT INTO claude_sessions (session_id, cwd, started_at, last_heartbeat)
             VALUES (?1, ?2, ?3, ?3)",
            params![session_id, cwd, base.to_rfc3339()],
        )
        .unwrap();
        for offset in minute_offsets {
            conn.execute(
                "INSERT INTO session_activity_log (session_id, event_type, tool_name, timestamp)
                 VALUES (?1, 'tool_use', 'Bash', ?2)",
                params![session_id, (base + Duration::minutes(*offset)).to_rfc3339()],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_active_hours_sums_small_gaps_only() {
        let (store, _dir) = test_store();
        // Gaps: 10m, 10m, 90m (idle, skipped), 10m -> 30m active
        seed_session(&store, "s1", "/home/jay/jaybrain", &[0, 10, 20, 110, 120]);
        let hours = session_active_hours(&store, "s1", 30).unwrap();
        assert!((hours - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_event_session_is_zero() {
        let (store, _dir) = test_store();
        seed_session(&store, "s1", "/x", &[0]);
        assert_eq!(session_active_hours(&store, "s1", 30).unwrap(), 0.0);
    }

    #[test]
    fn test_cwd_mapping_first_match_wins() {
        let map = vec![
            ("jaybrain".to_string(), "Career".to_string()),
            ("jay".to_string(), "Other".to_string()),
        ];
        assert_eq!(map_cwd_to_domain("/home/jay/JayBrain/src", &map), "Career");
        assert_eq!(map_cwd_to_domain("/etc", &map), "Uncategorized");
    }

    #[test]
    fn test_weekly_report_compares_targets() {
        let (store, _dir) = test_store();
        let config = config_with_map();
        store.life_domain_upsert("Career", "", 5, 10.0).unwrap();
        // 60 minutes of active time in a Career cwd
        seed_session(
            &store,
            "s1",
            "/home/jay/jaybrain",
            &[0, 10, 20, 30, 40, 50, 60],
        );

        let report = weekly_report(&store, &config).unwrap();
        let career = report.domains.iter().find(|d| d.name == "Career").unwrap();
        assert!((career.actual_hours - 1.0).abs() < 0.11);
        assert_eq!(career.target_hours, 10.0);
        assert_eq!(career.status, "under");
        assert_eq!(report.sessions_analyzed, 1);
    }

    #[test]
    fn test_check_triggers_on_drift() {
        let (store, _dir) = test_store();
        let config = config_with_map();
        store.life_domain_upsert("Career", "", 5, 40.0).unwrap();
        seed_session(&store, "s1", "/home/jay/jaybrain", &[0, 10]);

        let notifier = crate::notify::LogNotifier;
        let check = check_time_allocation(&store, &notifier, &config).unwrap();
        assert!(check.triggered);
        assert!(check.message.contains("under target"));
    }

    #[test]
    fn test_check_quiet_without_targets() {
        let (store, _dir) = test_store();
        let config = config_with_map();
        let notifier = crate::notify::LogNotifier;
        let check = check_time_allocation(&store, &notifier, &config).unwrap();
        assert!(!check.triggered);
    }
}
