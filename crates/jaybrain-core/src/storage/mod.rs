//! Store
//!
//! Single-file embedded store: SQLite with WAL, FTS5 keyword indexes, and
//! co-located embedding blobs mirrored into an in-process HNSW index.
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self` (not `&mut self`), making `Store` `Send + Sync` so
//! the MCP layer can share an `Arc<Store>`.

pub mod migrations;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use rusqlite::Connection;
use uuid::Uuid;

use crate::embeddings::EMBEDDING_DIMENSIONS;

#[cfg(feature = "vector-search")]
use crate::search::vector::VectorIndex;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Bad argument: unknown column, bad enum, out-of-range value
    #[error("Validation error: {0}")]
    Validation(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// ID / TIME HELPERS
// ============================================================================

/// Generate a 12-hex-char row id (truncated UUID v4).
pub fn short_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

/// Current UTC instant as an RFC 3339 string, the store's timestamp format.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// COLUMN ALLOWLIST
// ============================================================================

/// Columns the generic `update_row` helper may touch, per table.
///
/// `id` and `created_at` are never listed; anything not listed is rejected
/// before any SQL is prepared.
fn allowed_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "tasks" => Some(&[
            "title",
            "description",
            "status",
            "priority",
            "project",
            "tags",
            "due_date",
            "queue_position",
            "updated_at",
        ]),
        "knowledge" => Some(&["title", "content", "category", "tags", "source", "updated_at"]),
        "forge_concepts" => Some(&[
            "term",
            "definition",
            "category",
            "difficulty",
            "bloom_level",
            "mastery_level",
            "review_count",
            "correct_count",
            "last_reviewed",
            "next_review",
            "tags",
            "subject_id",
        ]),
        "job_boards" => Some(&[
            "name",
            "url",
            "board_type",
            "tags",
            "active",
            "last_checked",
            "content_hash",
        ]),
        "applications" => Some(&[
            "job_id",
            "status",
            "resume_path",
            "cover_letter_path",
            "applied_date",
            "notes",
            "updated_at",
        ]),
        "graph_entities" => Some(&[
            "name",
            "entity_type",
            "description",
            "aliases",
            "memory_ids",
            "properties",
            "updated_at",
        ]),
        "graph_relationships" => Some(&[
            "rel_type",
            "weight",
            "evidence_ids",
            "properties",
            "updated_at",
        ]),
        "telegram_bot_state" => Some(&["chat_id", "last_update_id", "paused"]),
        "cram_topics" => Some(&["name", "priority", "notes"]),
        "news_feed_sources" => Some(&["name", "url", "active", "last_polled"]),
        "signalforge_articles" => Some(&["title", "url", "source", "content", "score"]),
        "signalforge_clusters" => Some(&["label", "article_ids"]),
        "signalforge_synthesis" => Some(&["cluster_id", "summary"]),
        _ => None,
    }
}

/// Convert a JSON field value to the SQL value we bind.
///
/// Strings and numbers bind natively; arrays and objects bind as their JSON
/// text, matching the `'[]'` / `'{}'` column conventions.
fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        serde_json::Value::Null => Sql::Null,
        serde_json::Value::Bool(b) => Sql::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

// ============================================================================
// VECTOR ENCODING
// ============================================================================

/// Pack an embedding as a little-endian f32 byte blob.
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Unpack a little-endian f32 byte blob. Returns `None` on a ragged length.
pub fn embedding_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

// ============================================================================
// STORE
// ============================================================================

/// Capacity of the query-embedding LRU cache
const QUERY_CACHE_SIZE: usize = 100;

/// Main store handle.
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[cfg(feature = "vector-search")]
    memory_index: Mutex<VectorIndex>,
    #[cfg(feature = "vector-search")]
    knowledge_index: Mutex<VectorIndex>,
    /// LRU cache for query embeddings to avoid re-embedding repeated queries
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Store {
    /// Apply PRAGMAs to a connection.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 10000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`, running pending migrations.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&mut writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        #[cfg(feature = "vector-search")]
        let memory_index = VectorIndex::new()
            .map_err(|e| StoreError::Init(format!("Failed to create memory index: {e}")))?;
        #[cfg(feature = "vector-search")]
        let knowledge_index = VectorIndex::new()
            .map_err(|e| StoreError::Init(format!("Failed to create knowledge index: {e}")))?;

        let store = Self {
            path,
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            #[cfg(feature = "vector-search")]
            memory_index: Mutex::new(memory_index),
            #[cfg(feature = "vector-search")]
            knowledge_index: Mutex::new(knowledge_index),
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        };

        #[cfg(feature = "vector-search")]
        store.load_embeddings_into_indexes()?;

        Ok(store)
    }

    /// Open the store at the configured default location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::config::get().store_path())
    }

    /// Path of the backing store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the writer connection.
    pub(crate) fn write(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))
    }

    /// Acquire the reader connection.
    pub(crate) fn read(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))
    }

    /// Load persisted embedding blobs into the in-process HNSW indexes.
    #[cfg(feature = "vector-search")]
    fn load_embeddings_into_indexes(&self) -> Result<()> {
        for (table, index) in [
            ("memory_vec", &self.memory_index),
            ("knowledge_vec", &self.knowledge_index),
        ] {
            let rows: Vec<(String, Vec<u8>)> = {
                let reader = self.read()?;
                let mut stmt = reader.prepare(&format!("SELECT id, embedding FROM {table}"))?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            };

            let mut index = index
                .lock()
                .map_err(|_| StoreError::Init("Vector index lock poisoned".into()))?;
            for (id, blob) in rows {
                match embedding_from_bytes(&blob) {
                    Some(vector) if vector.len() == EMBEDDING_DIMENSIONS => {
                        if let Err(e) = index.add(&id, &vector) {
                            tracing::warn!("Failed to index embedding for {}: {}", id, e);
                        }
                    }
                    _ => tracing::warn!("Skipping malformed embedding blob for {}", id),
                }
            }
        }
        Ok(())
    }

    /// Access the memory vector index.
    #[cfg(feature = "vector-search")]
    pub(crate) fn memory_index(&self) -> Result<MutexGuard<'_, VectorIndex>> {
        self.memory_index
            .lock()
            .map_err(|_| StoreError::Init("Vector index lock poisoned".into()))
    }

    /// Access the knowledge vector index.
    #[cfg(feature = "vector-search")]
    pub(crate) fn knowledge_index(&self) -> Result<MutexGuard<'_, VectorIndex>> {
        self.knowledge_index
            .lock()
            .map_err(|_| StoreError::Init("Vector index lock poisoned".into()))
    }

    /// Embed a query string, memoised through the LRU cache.
    ///
    /// Returns `None` when embeddings are unavailable (feature off or model
    /// init failed) — callers degrade to keyword-only retrieval.
    pub(crate) fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(hit) = cache.get(query) {
                return Some(hit.clone());
            }
        }

        let vector = crate::embeddings::embed_text(query)?;

        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Some(vector)
    }

    // ========================================================================
    // GENERIC ROW UPDATE (allowlist-gated)
    // ========================================================================

    /// Update named columns on one row.
    ///
    /// Every field name is checked against the per-table allowlist before any
    /// SQL is prepared; unknown tables, unknown columns, and the permanent
    /// denylist (`id`, `created_at`) fail with [`StoreError::Validation`].
    pub fn update_row(
        &self,
        table: &str,
        id: &str,
        fields: &[(&str, serde_json::Value)],
    ) -> Result<usize> {
        let allowed = allowed_columns(table).ok_or_else(|| {
            StoreError::Validation(format!("table '{table}' is not updatable"))
        })?;

        if fields.is_empty() {
            return Err(StoreError::Validation("no fields to update".into()));
        }

        for (name, _) in fields {
            if *name == "id" || *name == "created_at" {
                return Err(StoreError::Validation(format!(
                    "column '{name}' may not be updated"
                )));
            }
            if !allowed.contains(name) {
                return Err(StoreError::Validation(format!(
                    "unknown column '{name}' for table '{table}'"
                )));
            }
        }

        let set_clause: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            set_clause.join(", "),
            fields.len() + 1
        );

        let mut params: Vec<rusqlite::types::Value> =
            fields.iter().map(|(_, v)| json_to_sql(v)).collect();
        params.push(rusqlite::types::Value::Text(id.to_string()));

        let conn = self.write()?;
        let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(changed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
