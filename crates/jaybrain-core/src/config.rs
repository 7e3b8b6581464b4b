//! Runtime Configuration
//!
//! Every tunable threshold is loaded from the environment at process start,
//! with documented defaults. The loaded `Config` lives behind a global
//! `OnceLock`; tests construct their own instances.
//!
//! Also home of the SSRF guard: any URL a fetcher touches goes through
//! [`validate_url`] first.

use std::collections::HashSet;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::NaiveDate;
use directories::ProjectDirs;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Configuration / validation error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// URL failed SSRF validation
    #[error("URL rejected: {0}")]
    UrlRejected(String),
    /// Data directory could not be determined or created
    #[error("Data directory error: {0}")]
    DataDir(String),
}

/// Config result type
pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// CONFIG
// ============================================================================

/// Runtime configuration, sourced from environment variables.
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | `JAYBRAIN_DATA_DIR` | platform data dir | root of all persisted state |
/// | `JAYBRAIN_BASE_HALF_LIFE_DAYS` | 90 | decay half-life floor |
/// | `JAYBRAIN_ACCESS_BONUS_DAYS` | 30 | half-life extension per access |
/// | `JAYBRAIN_MAX_HALF_LIFE_DAYS` | 730 | half-life cap |
/// | `JAYBRAIN_IDLE_THRESHOLD_MINUTES` | 30 | time-allocation gap cutoff |
/// | `JAYBRAIN_FORGE_DUE_THRESHOLD` | 5 | due concepts before a study nudge |
/// | `JAYBRAIN_APP_STALE_DAYS` | 7 | applied-with-no-reply follow-up window |
/// | `JAYBRAIN_EXAM_DATE` | unset | `YYYY-MM-DD` exam date for countdowns |
/// | `JAYBRAIN_SSRF_ALLOW` | empty | comma-separated hostnames that bypass DNS checks |
/// | `JAYBRAIN_PROJECTS_DIR` | `~/.claude/projects` | assistant transcript root |
/// | `JAYBRAIN_ARCHIVE_AFTER_DAYS` | 7 | transcript age window for the archiver |
/// | `JAYBRAIN_CWD_DOMAIN_MAP` | empty | `substr=Domain,substr=Domain` cwd mapping |
/// | `JAYBRAIN_TIME_LOOKBACK_DAYS` | 7 | time-allocation report window |
/// | `JAYBRAIN_SHADOW_REPOS` | empty | comma-separated repos for shadow snapshots |
/// | `JAYBRAIN_WATCH_ROOTS` | empty | comma-separated roots for the deletion watcher |
/// | `JAYBRAIN_VAULT_DIR` | unset | markdown vault target for the sync job |
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the store, trash, handoffs, lock files
    pub data_dir: PathBuf,
    /// Decay half-life floor in days
    pub base_half_life_days: f64,
    /// Half-life extension per recorded access, in days
    pub access_bonus_days: f64,
    /// Half-life cap in days
    pub max_half_life_days: f64,
    /// Gap length that ends a work block when deriving session time
    pub idle_threshold_minutes: i64,
    /// Due-concept count that triggers the study heartbeat
    pub forge_due_threshold: i64,
    /// Days before an 'applied' application counts as stale
    pub app_stale_days: i64,
    /// Configured exam date, if any
    pub exam_date: Option<NaiveDate>,
    /// Hostnames exempt from SSRF DNS resolution checks
    pub ssrf_allow: HashSet<String>,
    /// Directory holding per-session JSONL transcripts
    pub projects_dir: PathBuf,
    /// Only transcripts newer than this many days are archived
    pub archive_after_days: i64,
    /// Ordered `(substring, domain)` pairs mapping a session cwd to a life
    /// domain; first match wins
    pub cwd_domain_map: Vec<(String, String)>,
    /// Lookback window for the time-allocation report, in days
    pub time_lookback_days: i64,
    /// Repositories the git shadow job snapshots
    pub shadow_repos: Vec<PathBuf>,
    /// Roots the file-deletion watcher observes
    pub watch_roots: Vec<PathBuf>,
    /// Markdown vault directory for the sync job; unset disables it
    pub vault_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("JAYBRAIN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let projects_dir = std::env::var("JAYBRAIN_PROJECTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().join(".claude/projects"))
                    .unwrap_or_else(|| PathBuf::from(".claude/projects"))
            });

        let ssrf_allow = std::env::var("JAYBRAIN_SSRF_ALLOW")
            .map(|s| {
                s.split(',')
                    .map(|h| h.trim().to_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let exam_date = std::env::var("JAYBRAIN_EXAM_DATE")
            .ok()
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

        let cwd_domain_map = std::env::var("JAYBRAIN_CWD_DOMAIN_MAP")
            .map(|s| {
                s.split(',')
                    .filter_map(|pair| {
                        let (pattern, domain) = pair.split_once('=')?;
                        let (pattern, domain) = (pattern.trim(), domain.trim());
                        if pattern.is_empty() || domain.is_empty() {
                            None
                        } else {
                            Some((pattern.to_string(), domain.to_string()))
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            data_dir,
            base_half_life_days: env_f64("JAYBRAIN_BASE_HALF_LIFE_DAYS", 90.0),
            access_bonus_days: env_f64("JAYBRAIN_ACCESS_BONUS_DAYS", 30.0),
            max_half_life_days: env_f64("JAYBRAIN_MAX_HALF_LIFE_DAYS", 730.0),
            idle_threshold_minutes: env_i64("JAYBRAIN_IDLE_THRESHOLD_MINUTES", 30),
            forge_due_threshold: env_i64("JAYBRAIN_FORGE_DUE_THRESHOLD", 5),
            app_stale_days: env_i64("JAYBRAIN_APP_STALE_DAYS", 7),
            exam_date,
            ssrf_allow,
            projects_dir,
            archive_after_days: env_i64("JAYBRAIN_ARCHIVE_AFTER_DAYS", 7),
            cwd_domain_map,
            time_lookback_days: env_i64("JAYBRAIN_TIME_LOOKBACK_DAYS", 7),
            shadow_repos: env_paths("JAYBRAIN_SHADOW_REPOS"),
            watch_roots: env_paths("JAYBRAIN_WATCH_ROOTS"),
            vault_dir: std::env::var("JAYBRAIN_VAULT_DIR").ok().map(PathBuf::from),
        }
    }

    /// Path to the primary store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("jaybrain.store")
    }

    /// Path to the trash root.
    pub fn trash_dir(&self) -> PathBuf {
        self.data_dir.join("trash")
    }

    /// Path to the session handoff directory.
    pub fn handoff_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Path to the active-session pointer file.
    pub fn active_session_file(&self) -> PathBuf {
        self.data_dir.join(".active_session")
    }

    /// Path to the daemon PID file.
    pub fn daemon_pid_file(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }

    /// Path to the daemon lock file.
    pub fn daemon_lock_file(&self) -> PathBuf {
        self.data_dir.join("daemon.lock")
    }

    /// Path to the YAML profile.
    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("profile.yaml")
    }

    /// Validate a URL against this config's allow-set. See [`validate_url`].
    pub fn validate_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        validate_url(url, &self.ssrf_allow)
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_paths(key: &str) -> Vec<PathBuf> {
    std::env::var(key)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "jaybrain", "core") {
        return proj_dirs.data_dir().to_path_buf();
    }
    PathBuf::from("data")
}

/// Global config, loaded once from the environment.
pub fn get() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(Config::from_env)
}

// ============================================================================
// SSRF GUARD
// ============================================================================

/// Validate a URL before any fetcher touches it.
///
/// Rules:
/// - scheme must be http or https
/// - the URL must carry a hostname
/// - hostnames in `allow` bypass DNS entirely
/// - otherwise every resolved address must be public: loopback, private v4
///   (10/8, 172.16/12, 192.168/16), link-local (169.254/16), and the IPv6
///   loopback/link-local/unique-local ranges are rejected
/// - an unresolvable hostname is rejected
///
/// Returns the URL unchanged on success so call sites can chain it.
pub fn validate_url<'a>(url: &'a str, allow: &HashSet<String>) -> Result<&'a str> {
    let parsed = url::Url::parse(url)
        .map_err(|e| ConfigError::UrlRejected(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::UrlRejected(format!(
                "{url}: scheme '{other}' not allowed"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ConfigError::UrlRejected(format!("{url}: missing hostname")))?;

    if allow.contains(&host.to_lowercase()) {
        return Ok(url);
    }

    // Literal IP in the URL: check it directly, no DNS involved
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return if ip_is_public(&ip) {
            Ok(url)
        } else {
            Err(ConfigError::UrlRejected(format!(
                "{url}: address {ip} is not public"
            )))
        };
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<IpAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| ConfigError::UrlRejected(format!("{url}: unresolvable host: {e}")))?
        .map(|a| a.ip())
        .collect();

    if addrs.is_empty() {
        return Err(ConfigError::UrlRejected(format!(
            "{url}: host resolved to no addresses"
        )));
    }

    for ip in &addrs {
        if !ip_is_public(ip) {
            return Err(ConfigError::UrlRejected(format!(
                "{url}: resolves to non-public address {ip}"
            )));
        }
    }

    Ok(url)
}

/// Whether an address is safe to fetch from.
pub(crate) fn ip_is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            // Unique-local fc00::/7 and link-local fe80::/10 aren't covered by
            // the stable std predicates, so mask the leading bits directly.
            let seg = v6.segments()[0];
            let unique_local = (seg & 0xfe00) == 0xfc00;
            let link_local = (seg & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn no_allow() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com/file", &no_allow()).is_err());
        assert!(validate_url("file:///etc/passwd", &no_allow()).is_err());
    }

    #[test]
    fn test_rejects_loopback_literal() {
        assert!(validate_url("http://127.0.0.1/admin", &no_allow()).is_err());
        assert!(validate_url("http://[::1]/admin", &no_allow()).is_err());
    }

    #[test]
    fn test_rejects_private_literals() {
        assert!(validate_url("http://10.0.0.5/", &no_allow()).is_err());
        assert!(validate_url("http://172.16.1.1/", &no_allow()).is_err());
        assert!(validate_url("http://192.168.1.10/", &no_allow()).is_err());
        assert!(validate_url("http://169.254.169.254/latest/meta-data", &no_allow()).is_err());
    }

    #[test]
    fn test_accepts_public_literal() {
        assert!(validate_url("http://93.184.216.34/", &no_allow()).is_ok());
    }

    #[test]
    fn test_allowlist_bypasses_dns() {
        let mut allow = HashSet::new();
        allow.insert("internal.lab".to_string());
        // Hostname doesn't resolve, but the allow-set short-circuits
        assert!(validate_url("http://internal.lab/status", &allow).is_ok());
    }

    #[test]
    fn test_unresolvable_host_rejected() {
        assert!(
            validate_url("http://definitely-not-a-real-host.invalid/", &no_allow()).is_err()
        );
    }

    #[test]
    fn test_missing_host_rejected() {
        assert!(validate_url("http:///path-only", &no_allow()).is_err());
    }

    #[test]
    fn test_ipv6_unique_local_rejected() {
        let ip: IpAddr = "fd12:3456:789a::1".parse().unwrap();
        assert!(!ip_is_public(&ip));
        let public: IpAddr = "2606:2800:220:1:248:1893:25c8:1946".parse().unwrap();
        assert!(ip_is_public(&public));
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_env();
        assert!(cfg.base_half_life_days > 0.0);
        assert!(cfg.max_half_life_days >= cfg.base_half_life_days);
        assert_eq!(cfg.store_path().file_name().unwrap(), "jaybrain.store");
    }
}
