//! Retrieval Decay Model
//!
//! Each recall hit is multiplied by a decay score derived from the memory's
//! age, importance, and access history. The clock runs from the last access
//! (or creation), so touching a memory lifts it back toward 1.0.
//!
//! All constants live here, at the edge of the module.

use chrono::{DateTime, Utc};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Half-life of an untouched memory, in days
pub const BASE_HALF_LIFE_DAYS: f64 = 90.0;

/// Half-life extension earned per recorded access, in days
pub const ACCESS_BONUS_DAYS: f64 = 30.0;

/// Cap on the effective half-life, in days
pub const MAX_HALF_LIFE_DAYS: f64 = 730.0;

/// Floor: no memory ever scores below this
pub const MIN_DECAY: f64 = 0.05;

// ============================================================================
// DECAY
// ============================================================================

/// Decay multiplier in [`MIN_DECAY`], 1.0].
///
/// `raw = 2^(-age_days / half_life)` where the half-life grows with
/// `access_count` up to the cap, then importance scales the result linearly
/// between 50% (importance 0) and 100% (importance 1) of `raw`.
pub fn decay_multiplier(
    created_at: DateTime<Utc>,
    importance: f64,
    access_count: i64,
    last_accessed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let reference = last_accessed.unwrap_or(created_at);
    let age_days = (now - reference).num_seconds().max(0) as f64 / 86_400.0;

    let half_life = (BASE_HALF_LIFE_DAYS + access_count.max(0) as f64 * ACCESS_BONUS_DAYS)
        .min(MAX_HALF_LIFE_DAYS);

    let raw = 2f64.powf(-age_days / half_life);
    let importance = importance.clamp(0.0, 1.0);

    (raw * (0.5 + importance / 2.0)).clamp(MIN_DECAY, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn days_ago(now: DateTime<Utc>, days: f64) -> DateTime<Utc> {
        now - Duration::seconds((days * 86_400.0) as i64)
    }

    #[test]
    fn test_fresh_max_importance_is_exactly_one() {
        let now = Utc::now();
        assert_eq!(decay_multiplier(now, 1.0, 0, None, now), 1.0);
    }

    #[test]
    fn test_one_half_life_max_importance_is_half() {
        let now = Utc::now();
        let created = days_ago(now, BASE_HALF_LIFE_DAYS);
        let score = decay_multiplier(created, 1.0, 0, None, now);
        assert!((score - 0.5).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn test_ancient_memory_never_below_floor() {
        let now = Utc::now();
        let created = days_ago(now, 10_000.0);
        let score = decay_multiplier(created, 0.0, 0, None, now);
        assert_eq!(score, MIN_DECAY);
    }

    #[test]
    fn test_monotone_decreasing_in_age() {
        let now = Utc::now();
        let young = decay_multiplier(days_ago(now, 10.0), 0.8, 0, None, now);
        let old = decay_multiplier(days_ago(now, 60.0), 0.8, 0, None, now);
        assert!(young > old);
    }

    #[test]
    fn test_monotone_increasing_in_importance() {
        let now = Utc::now();
        let created = days_ago(now, 45.0);
        let low = decay_multiplier(created, 0.2, 0, None, now);
        let high = decay_multiplier(created, 0.9, 0, None, now);
        assert!(high > low);
    }

    #[test]
    fn test_monotone_increasing_in_access_count_up_to_cap() {
        let now = Utc::now();
        let created = days_ago(now, 200.0);
        let cold = decay_multiplier(created, 0.5, 0, None, now);
        let warm = decay_multiplier(created, 0.5, 5, None, now);
        assert!(warm > cold);

        // Past the cap extra accesses change nothing
        let at_cap = decay_multiplier(created, 0.5, 1_000, None, now);
        let past_cap = decay_multiplier(created, 0.5, 2_000, None, now);
        assert_eq!(at_cap, past_cap);
    }

    #[test]
    fn test_recent_access_resets_the_clock() {
        let now = Utc::now();
        let created = days_ago(now, 300.0);
        let untouched = decay_multiplier(created, 0.5, 0, None, now);
        let touched = decay_multiplier(created, 0.5, 1, Some(days_ago(now, 1.0)), now);
        assert!(touched > untouched);
    }

    #[test]
    fn test_importance_out_of_range_is_clamped() {
        let now = Utc::now();
        assert_eq!(decay_multiplier(now, 3.0, 0, None, now), 1.0);
        let score = decay_multiplier(now, -1.0, 0, None, now);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
