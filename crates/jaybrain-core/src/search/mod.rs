//! Hybrid Search Plumbing
//!
//! Query sanitisation for the FTS5 keyword indexes, per-list min-max
//! normalisation, and the weighted fusion used by memory and knowledge
//! recall. The decay multiplier applied after fusion lives with the memory
//! module.

#[cfg(feature = "vector-search")]
pub mod vector;

use std::collections::HashMap;

/// Overfetch factor applied to each side before fusion
pub const VEC_OVERFETCH: usize = 4;

/// Default weight on the vector (semantic) side
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.6;

/// Default weight on the keyword (FTS5/BM25) side
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.4;

// ============================================================================
// QUERY SANITISATION
// ============================================================================

/// Sanitise free text into an FTS5 MATCH expression.
///
/// Strips everything that is not a word character, splits on whitespace and
/// emits one quoted token per word. Returns an empty string when nothing
/// survives — callers treat that as "no results", never an error, because
/// FTS5 raises on syntax characters like `"` or `-` in raw input.
pub fn sanitize_match_query(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// NORMALISATION + FUSION
// ============================================================================

/// Min-max normalise a list where a LOWER raw value is better (L2 distance,
/// BM25 rank score) into [0, 1] with the best item at 1.0.
///
/// A single-element (or constant) list maps to all-1.0; an empty list stays
/// empty and contributes nothing to fusion.
pub fn normalize_lower_is_better(results: &[(String, f32)]) -> Vec<(String, f32)> {
    if results.is_empty() {
        return vec![];
    }
    let min = results.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = results
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    results
        .iter()
        .map(|(id, score)| {
            let norm = if range <= f32::EPSILON {
                1.0
            } else {
                (max - score) / range
            };
            (id.clone(), norm)
        })
        .collect()
}

/// Fuse two normalised result lists with a weighted sum over the union of
/// ids. A side that did not return an id contributes 0 on that axis.
pub fn fuse_weighted(
    vector_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (id, norm) in vector_results {
        *scores.entry(id.clone()).or_default() += norm * vector_weight;
    }
    for (id, norm) in keyword_results {
        *scores.entry(id.clone()).or_default() += norm * keyword_weight;
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

// ============================================================================
// TESTS
// ============================================================================
