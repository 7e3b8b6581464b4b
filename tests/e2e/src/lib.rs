//! Shared harness for the end-to-end scenario tests.

use std::sync::Arc;

use jaybrain_core::{Config, Store};
use tempfile::TempDir;

/// A fresh store + config rooted in a temp directory.
pub fn test_env() -> (Arc<Store>, Config, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(Store::open(dir.path().join("jaybrain.store")).expect("open store"));
    let mut config = Config::from_env();
    config.data_dir = dir.path().to_path_buf();
    config.projects_dir = dir.path().join("projects");
    (store, config, dir)
}

/// A unit vector along one axis of the embedding space.
pub fn basis_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; jaybrain_core::EMBEDDING_DIMENSIONS];
    v[axis] = 1.0;
    v
}

/// A unit vector close to `axis` (cosine ≈ 0.995 against the basis vector).
pub fn near_vector(axis: usize, other: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; jaybrain_core::EMBEDDING_DIMENSIONS];
    v[axis] = 1.0;
    v[other] = 0.1;
    jaybrain_core::l2_normalize(&mut v);
    v
}
