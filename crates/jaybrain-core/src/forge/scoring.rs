//! Review Scoring
//!
//! The two mastery-delta tables (v1 outcome-driven, v2 two-axis), the
//! interval bands keyed on post-review mastery, the error taxonomy for
//! wrong answers, and streak arithmetic. All tuning constants are named
//! here and nowhere else.

use chrono::NaiveDate;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Confidence at or above this counts as "confident"
pub const CONFIDENT_THRESHOLD: i64 = 4;

/// Mastery below this marks a concept as struggling
pub const STRUGGLING_MASTERY: f64 = 0.3;

// v1 deltas (outcome-driven, used when correctness is unknown)
pub const DELTA_UNDERSTOOD_CONFIDENT: f64 = 0.15;
pub const DELTA_UNDERSTOOD_UNSURE: f64 = 0.10;
pub const DELTA_REVIEWED: f64 = 0.05;
pub const DELTA_STRUGGLED: f64 = -0.10;

// v2 deltas (two-axis: correctness x confidence)
pub const DELTA_CORRECT_CONFIDENT: f64 = 0.20;
pub const DELTA_CORRECT_UNSURE: f64 = 0.10;
pub const DELTA_INCORRECT_CONFIDENT: f64 = -0.15;
pub const DELTA_INCORRECT_UNSURE: f64 = -0.05;

// Interval bands: post-review mastery decides the next gap (days)
pub const INTERVAL_LOW_DAYS: i64 = 1; // mastery < 0.25
pub const INTERVAL_LOWER_MID_DAYS: i64 = 3; // < 0.40
pub const INTERVAL_MID_DAYS: i64 = 7; // < 0.60
pub const INTERVAL_UPPER_MID_DAYS: i64 = 14; // < 0.80
pub const INTERVAL_HIGH_DAYS: i64 = 30; // >= 0.80

// ============================================================================
// TYPES
// ============================================================================

/// Review outcomes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Understood,
    Reviewed,
    Struggled,
    Skipped,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Understood => "understood",
            ReviewOutcome::Reviewed => "reviewed",
            ReviewOutcome::Struggled => "struggled",
            ReviewOutcome::Skipped => "skipped",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "understood" => Some(ReviewOutcome::Understood),
            "reviewed" => Some(ReviewOutcome::Reviewed),
            "struggled" => Some(ReviewOutcome::Struggled),
            "skipped" => Some(ReviewOutcome::Skipped),
            _ => None,
        }
    }
}

/// Error taxonomy for wrong answers
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Knew it, fumbled it
    Slip,
    /// Knew it once, forgot
    Lapse,
    /// Never knew it
    Mistake,
    /// Confidently wrong — the dangerous one
    Misconception,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Slip => "slip",
            ErrorKind::Lapse => "lapse",
            ErrorKind::Mistake => "mistake",
            ErrorKind::Misconception => "misconception",
        }
    }
}

// ============================================================================
// DELTAS
// ============================================================================

/// v1 mastery delta: outcome-driven, used when correctness is unknown.
pub fn mastery_delta_v1(outcome: ReviewOutcome, confidence: i64) -> f64 {
    match outcome {
        ReviewOutcome::Understood => {
            if confidence >= CONFIDENT_THRESHOLD {
                DELTA_UNDERSTOOD_CONFIDENT
            } else {
                DELTA_UNDERSTOOD_UNSURE
            }
        }
        ReviewOutcome::Reviewed => DELTA_REVIEWED,
        ReviewOutcome::Struggled => DELTA_STRUGGLED,
        ReviewOutcome::Skipped => 0.0,
    }
}

/// v2 mastery delta: correctness x confidence.
pub fn mastery_delta_v2(was_correct: bool, confidence: i64) -> f64 {
    match (was_correct, confidence >= CONFIDENT_THRESHOLD) {
        (true, true) => DELTA_CORRECT_CONFIDENT,
        (true, false) => DELTA_CORRECT_UNSURE,
        (false, true) => DELTA_INCORRECT_CONFIDENT,
        (false, false) => DELTA_INCORRECT_UNSURE,
    }
}

/// Next-review gap in days, keyed on the POST-review mastery band only.
pub fn next_interval_days(mastery: f64) -> i64 {
    if mastery < 0.25 {
        INTERVAL_LOW_DAYS
    } else if mastery < 0.40 {
        INTERVAL_LOWER_MID_DAYS
    } else if mastery < 0.60 {
        INTERVAL_MID_DAYS
    } else if mastery < 0.80 {
        INTERVAL_UPPER_MID_DAYS
    } else {
        INTERVAL_HIGH_DAYS
    }
}

/// Classify a wrong answer. `mastery`, `correct_count`, and `review_count`
/// are the values BEFORE this review was applied. Returns `None` for correct
/// answers.
pub fn classify_error(
    was_correct: bool,
    confidence: i64,
    mastery: f64,
    correct_count: i64,
    _review_count: i64,
) -> Option<ErrorKind> {
    if was_correct {
        return None;
    }
    if confidence >= CONFIDENT_THRESHOLD {
        return Some(ErrorKind::Misconception);
    }
    if mastery >= 0.5 {
        return Some(ErrorKind::Lapse);
    }
    if correct_count >= 2 {
        return Some(ErrorKind::Slip);
    }
    Some(ErrorKind::Mistake)
}

// ============================================================================
// STREAKS
// ============================================================================

/// `(current, longest)` streak lengths over study-day dates.
///
/// `current` counts consecutive days ending today, or ending yesterday when
/// today has no entry yet. `longest` is the best run anywhere in history.
/// Input dates may arrive in any order; duplicates are ignored.
pub fn calculate_streaks(dates: &[NaiveDate], today: NaiveDate) -> (i64, i64) {
    if dates.is_empty() {
        return (0, 0);
    }

    let mut sorted: Vec<NaiveDate> = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    // Longest run anywhere
    let mut longest = 1i64;
    let mut run = 1i64;
    for pair in sorted.windows(2) {
        if pair[1] == pair[0].succ_opt().unwrap_or(pair[1]) {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    // Current run, anchored to today or yesterday
    let newest = *sorted.last().expect("non-empty");
    let yesterday = today.pred_opt().unwrap_or(today);
    if newest != today && newest != yesterday {
        return (0, longest);
    }

    let mut current = 0i64;
    let mut expected = newest;
    for date in sorted.iter().rev() {
        if *date == expected {
            current += 1;
            expected = match expected.pred_opt() {
                Some(d) => d,
                None => break,
            };
        } else {
            break;
        }
    }

    (current, longest)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_v1_understood_confidence_split() {
        assert_eq!(
            mastery_delta_v1(ReviewOutcome::Understood, 4),
            DELTA_UNDERSTOOD_CONFIDENT
        );
        assert_eq!(
            mastery_delta_v1(ReviewOutcome::Understood, 3),
            DELTA_UNDERSTOOD_UNSURE
        );
    }

    #[test]
    fn test_v1_other_outcomes() {
        assert_eq!(mastery_delta_v1(ReviewOutcome::Reviewed, 5), DELTA_REVIEWED);
        assert_eq!(mastery_delta_v1(ReviewOutcome::Struggled, 5), DELTA_STRUGGLED);
        assert_eq!(mastery_delta_v1(ReviewOutcome::Skipped, 5), 0.0);
    }

    #[test]
    fn test_v2_table_cells() {
        assert_eq!(mastery_delta_v2(true, 5), DELTA_CORRECT_CONFIDENT);
        assert_eq!(mastery_delta_v2(true, 2), DELTA_CORRECT_UNSURE);
        assert_eq!(mastery_delta_v2(false, 4), DELTA_INCORRECT_CONFIDENT);
        assert_eq!(mastery_delta_v2(false, 2), DELTA_INCORRECT_UNSURE);
    }

    #[test]
    fn test_v2_delta_ordering_invariant() {
        assert!(DELTA_CORRECT_CONFIDENT > DELTA_CORRECT_UNSURE);
        assert!(DELTA_CORRECT_UNSURE > 0.0);
        assert!(0.0 > DELTA_INCORRECT_UNSURE);
        assert!(DELTA_INCORRECT_UNSURE > DELTA_INCORRECT_CONFIDENT);
    }

    #[test]
    fn test_interval_bands() {
        assert_eq!(next_interval_days(0.0), 1);
        assert_eq!(next_interval_days(0.24), 1);
        assert_eq!(next_interval_days(0.25), 3);
        assert_eq!(next_interval_days(0.45), 7);
        assert_eq!(next_interval_days(0.7), 14);
        assert_eq!(next_interval_days(0.8), 30);
        assert_eq!(next_interval_days(1.0), 30);
    }

    #[test]
    fn test_classify_misconception() {
        assert_eq!(
            classify_error(false, 5, 0.3, 1, 3),
            Some(ErrorKind::Misconception)
        );
    }

    #[test]
    fn test_classify_lapse() {
        assert_eq!(classify_error(false, 2, 0.7, 3, 5), Some(ErrorKind::Lapse));
    }

    #[test]
    fn test_classify_slip() {
        assert_eq!(classify_error(false, 2, 0.3, 2, 5), Some(ErrorKind::Slip));
    }

    #[test]
    fn test_classify_mistake() {
        assert_eq!(classify_error(false, 2, 0.1, 0, 1), Some(ErrorKind::Mistake));
    }

    #[test]
    fn test_classify_correct_is_none() {
        assert_eq!(classify_error(true, 5, 0.5, 3, 5), None);
    }

    #[test]
    fn test_streak_empty() {
        assert_eq!(calculate_streaks(&[], d("2026-03-10")), (0, 0));
    }

    #[test]
    fn test_streak_ending_today() {
        let dates = vec![d("2026-03-08"), d("2026-03-09"), d("2026-03-10")];
        assert_eq!(calculate_streaks(&dates, d("2026-03-10")), (3, 3));
    }

    #[test]
    fn test_streak_ending_yesterday_still_counts() {
        let dates = vec![d("2026-03-08"), d("2026-03-09")];
        assert_eq!(calculate_streaks(&dates, d("2026-03-10")), (2, 2));
    }

    #[test]
    fn test_streak_broken_by_gap() {
        let dates = vec![d("2026-03-01"), d("2026-03-02"), d("2026-03-05")];
        // Current run died days ago; longest remembers the 2-day run
        assert_eq!(calculate_streaks(&dates, d("2026-03-10")), (0, 2));
    }

    #[test]
    fn test_longest_survives_reset() {
        let dates = vec![
            d("2026-02-01"),
            d("2026-02-02"),
            d("2026-02-03"),
            d("2026-02-04"),
            d("2026-03-09"),
            d("2026-03-10"),
        ];
        assert_eq!(calculate_streaks(&dates, d("2026-03-10")), (2, 4));
    }

    #[test]
    fn test_streak_duplicates_ignored() {
        let dates = vec![d("2026-03-10"), d("2026-03-10"), d("2026-03-09")];
        assert_eq!(calculate_streaks(&dates, d("2026-03-10")), (2, 2));
    }
}
