//! Vector K-NN Index
//!
//! USearch HNSW index over the stored embeddings, keyed by row id. Rebuilt
//! from the embedding blobs at store open; L2 distance per the retrieval
//! contract (smaller = closer).

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::embeddings::EMBEDDING_DIMENSIONS;

// ============================================================================
// CONSTANTS
// ============================================================================

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    /// Failed to create the index
    #[error("Index creation failed: {0}")]
    IndexCreation(String),
    /// Failed to add a vector
    #[error("Failed to add vector: {0}")]
    IndexAdd(String),
    /// Failed to search
    #[error("Search failed: {0}")]
    IndexSearch(String),
    /// Dimension mismatch
    #[error("Invalid dimensions: expected {0}, got {1}")]
    InvalidDimensions(usize, usize),
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// HNSW index with string-keyed rows.
pub struct VectorIndex {
    index: Index,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    /// Create an empty index (L2 metric, 384 dims).
    pub fn new() -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions: EMBEDDING_DIMENSIONS,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };

        let index =
            Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        Ok(Self {
            index,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.index.size()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add or replace a vector under a string key.
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(VectorSearchError::InvalidDimensions(
                EMBEDDING_DIMENSIONS,
                vector.len(),
            ));
        }

        if let Some(&existing_id) = self.key_to_id.get(key) {
            self.index
                .remove(existing_id)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing_id, vector)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            return Ok(());
        }

        // usearch segfaults if add() outruns reserve()
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            self.reserve(std::cmp::max(capacity * 2, 16))?;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.index
            .add(id, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;

        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    /// Remove a vector by key. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorSearchError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Whether a key is indexed.
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    /// K-nearest neighbours as `(key, l2_distance)`, closest first.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>, VectorSearchError> {
        if query.len() != EMBEDDING_DIMENSIONS {
            return Err(VectorSearchError::InvalidDimensions(
                EMBEDDING_DIMENSIONS,
                query.len(),
            ));
        }

        if self.is_empty() {
            return Ok(vec![]);
        }

        let results = self
            .index
            .search(query, limit)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        let mut hits = Vec::with_capacity(results.keys.len());
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(string_key) = self.id_to_key.get(key) {
                hits.push((string_key.clone(), *distance));
            }
        }
        Ok(hits)
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorSearchError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorSearchError::IndexCreation(format!("reserve failed: {e}")))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vector(seed: f32) -> Vec<f32> {
        let mut v: Vec<f32> = (0..EMBEDDING_DIMENSIONS)
            .map(|i| ((i as f32 + seed) / EMBEDDING_DIMENSIONS as f32).sin())
            .collect();
        crate::embeddings::l2_normalize(&mut v);
        v
    }

    #[test]
    fn test_add_and_search_nearest() {
        let mut index = VectorIndex::new().unwrap();
        index.add("m-1", &test_vector(1.0)).unwrap();
        index.add("m-2", &test_vector(2.0)).unwrap();
        index.add("m-3", &test_vector(50.0)).unwrap();

        let results = index.search(&test_vector(1.0), 3).unwrap();
        assert_eq!(results[0].0, "m-1");
        // L2 distance to itself is ~0
        assert!(results[0].1 < 1e-5);
        // Distances ascend
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_update_replaces_vector() {
        let mut index = VectorIndex::new().unwrap();
        index.add("m-1", &test_vector(1.0)).unwrap();
        index.add("m-1", &test_vector(9.0)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new().unwrap();
        index.add("m-1", &test_vector(1.0)).unwrap();
        assert!(index.remove("m-1").unwrap());
        assert!(!index.contains("m-1"));
        assert!(!index.remove("m-1").unwrap());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::new().unwrap();
        assert!(index.add("m-1", &[1.0, 2.0]).is_err());
        assert!(index.search(&[1.0, 2.0], 5).is_err());
    }

    #[test]
    fn test_empty_index_returns_no_hits() {
        let index = VectorIndex::new().unwrap();
        assert!(index.search(&test_vector(1.0), 5).unwrap().is_empty());
    }
}
