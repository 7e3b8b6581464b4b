//! Local Semantic Embeddings
//!
//! Uses fastembed for local ONNX inference with all-MiniLM-L6-v2 (384
//! dimensions). The byte codec and vector math live outside the feature gate
//! so a keyword-only build can still round-trip stored blobs.

#[cfg(feature = "embeddings")]
use std::sync::{Mutex, OnceLock};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding dimensions (all-MiniLM-L6-v2)
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 4096;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

// ============================================================================
// GLOBAL MODEL
// ============================================================================

#[cfg(feature = "embeddings")]
static EMBEDDING_MODEL: OnceLock<Result<Mutex<fastembed::TextEmbedding>, String>> =
    OnceLock::new();

/// Cache directory for model files: `FASTEMBED_CACHE_PATH` env var, else the
/// platform cache directory.
#[cfg(feature = "embeddings")]
fn model_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "jaybrain", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

#[cfg(feature = "embeddings")]
fn get_model()
-> Result<std::sync::MutexGuard<'static, fastembed::TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache_dir = model_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create model cache dir {:?}: {}", cache_dir, e);
        }

        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        fastembed::TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize all-MiniLM-L6-v2: {e}"))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

// ============================================================================
// EMBEDDING API
// ============================================================================

/// Embed one text, L2-normalised.
///
/// Returns `None` when the model cannot be initialised — retrieval degrades
/// to keyword-only in that case, it never errors.
#[cfg(feature = "embeddings")]
pub fn embed_text(text: &str) -> Option<Vec<f32>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let clipped: String = trimmed.chars().take(MAX_TEXT_LENGTH).collect();
    let mut model = match get_model() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Embedding unavailable, keyword-only retrieval: {}", e);
            return None;
        }
    };
    match model.embed(vec![clipped], None) {
        Ok(mut vectors) if !vectors.is_empty() => {
            let mut v = vectors.remove(0);
            l2_normalize(&mut v);
            Some(v)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Embedding failed: {}", e);
            None
        }
    }
}

/// Keyword-only build: no model, always `None`.
#[cfg(not(feature = "embeddings"))]
pub fn embed_text(text: &str) -> Option<Vec<f32>> {
    let _ = text;
    None
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Normalise a vector to unit L2 length in place. No-op on the zero vector.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity of two vectors. Zero on dimension mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_noop() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity_identity() {
        let v = vec![0.1, 0.5, -0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_embed_empty_text_is_none() {
        assert!(embed_text("   ").is_none());
    }
}
