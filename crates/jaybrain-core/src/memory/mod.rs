//! Memory
//!
//! The decaying long-term store: remember / recall / forget, hybrid
//! keyword+vector retrieval with the decay multiplier, graph-aware deep
//! recall, and similarity-cluster consolidation into the archive.

pub mod decay;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::search::{
    fuse_weighted, normalize_lower_is_better, sanitize_match_query, DEFAULT_KEYWORD_WEIGHT,
    DEFAULT_VECTOR_WEIGHT, VEC_OVERFETCH,
};
use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// Memory categories
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// Facts and general knowledge
    #[default]
    Semantic,
    /// Events and experiences
    Episodic,
    /// How-to knowledge
    Procedural,
    /// Decisions made, with their context
    Decision,
    /// User preferences
    Preference,
}

impl MemoryCategory {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Semantic => "semantic",
            MemoryCategory::Episodic => "episodic",
            MemoryCategory::Procedural => "procedural",
            MemoryCategory::Decision => "decision",
            MemoryCategory::Preference => "preference",
        }
    }

    /// Strict parse; `None` for anything outside the enum.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "semantic" => Some(MemoryCategory::Semantic),
            "episodic" => Some(MemoryCategory::Episodic),
            "procedural" => Some(MemoryCategory::Procedural),
            "decision" => Some(MemoryCategory::Decision),
            "preference" => Some(MemoryCategory::Preference),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// 12-hex row id
    pub id: String,
    /// The remembered content
    pub content: String,
    /// Category (one of the [`MemoryCategory`] names)
    pub category: String,
    /// Ordered tags
    pub tags: Vec<String>,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last recall that returned this memory
    pub last_accessed: Option<DateTime<Utc>>,
    /// Number of recalls that returned this memory
    pub access_count: i64,
    /// Session that produced it, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Input for [`Store::remember`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RememberInput {
    pub content: String,
    /// Category name; empty means `semantic`
    pub category: String,
    pub tags: Vec<String>,
    /// Importance; clamped into [0, 1]
    pub importance: Option<f64>,
    pub session_id: Option<String>,
}

/// Input for [`Store::recall`]
#[derive(Debug, Clone, Deserialize)]
pub struct RecallInput {
    pub query: String,
    pub category: Option<String>,
    pub limit: usize,
    pub vector_weight: Option<f32>,
    pub keyword_weight: Option<f32>,
    pub include_archived: bool,
}

impl Default for RecallInput {
    fn default() -> Self {
        Self {
            query: String::new(),
            category: None,
            limit: 10,
            vector_weight: None,
            keyword_weight: None,
            include_archived: false,
        }
    }
}

/// One recall result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallHit {
    pub memory: Memory,
    /// Fused, decay-adjusted score in [0, 1]
    pub score: f32,
    /// Normalised vector-side score, if the vector side matched
    pub vector_score: Option<f32>,
    /// Normalised keyword-side score, if the keyword side matched
    pub keyword_score: Option<f32>,
    /// Decay multiplier applied
    pub decay: f64,
    /// Whether the hit came from the archive
    pub archived: bool,
}

/// Deep recall: hybrid hits plus one hop of graph context
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepRecallResult {
    pub hits: Vec<RecallHit>,
    /// Graph entities evidenced by the hits
    pub entities: Vec<crate::graph::GraphEntity>,
    /// Further memories those entities point at
    pub related_memories: Vec<Memory>,
}

/// One planned (or executed) cluster merge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMerge {
    /// Representative kept live
    pub kept_id: String,
    /// Members moved to the archive
    pub archived_ids: Vec<String>,
}

/// Consolidation outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub merges: Vec<ClusterMerge>,
    pub archived_count: usize,
    pub dry_run: bool,
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        category: row.get("category")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        importance: row.get("importance")?,
        created_at: row.get("created_at")?,
        last_accessed: row.get("last_accessed")?,
        access_count: row.get("access_count")?,
        session_id: row.get("session_id")?,
    })
}

const MEMORY_COLUMNS: &str =
    "id, content, category, tags, importance, created_at, last_accessed, access_count, session_id";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Store a new memory, embedding its content when the model is available.
    pub fn remember(&self, input: RememberInput) -> Result<Memory> {
        if input.content.trim().is_empty() {
            return Err(StoreError::Validation("memory content is empty".into()));
        }

        let category = if input.category.is_empty() {
            MemoryCategory::Semantic
        } else {
            MemoryCategory::parse_name(&input.category).ok_or_else(|| {
                StoreError::Validation(format!("unknown category '{}'", input.category))
            })?
        };

        let id = short_id();
        let now = Utc::now();
        let importance = input.importance.unwrap_or(0.5).clamp(0.0, 1.0);
        let tags_json = serde_json::to_string(&input.tags).unwrap_or_else(|_| "[]".into());

        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO memories (id, content, category, tags, importance, created_at, access_count, session_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    id,
                    input.content,
                    category.as_str(),
                    tags_json,
                    importance,
                    now.to_rfc3339(),
                    input.session_id,
                ],
            )?;
        }

        if let Some(vector) = crate::embeddings::embed_text(&input.content) {
            self.put_memory_embedding(&id, &vector)?;
        }

        self.get_memory(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a live memory by id.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.read()?;
        let memory = conn
            .query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                [id],
                |row| row_to_memory(row),
            )
            .optional()?;
        Ok(memory)
    }

    /// List live memories, newest first, optionally filtered by category.
    pub fn list_memories(&self, category: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        let conn = self.read()?;
        let mut memories = Vec::new();
        match category {
            Some(cat) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE category = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![cat, limit as i64], |row| row_to_memory(row))?;
                for row in rows {
                    memories.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit as i64], |row| row_to_memory(row))?;
                for row in rows {
                    memories.push(row?);
                }
            }
        }
        Ok(memories)
    }

    /// Upsert the embedding for a memory and mirror it into the K-NN index.
    ///
    /// Public so batch backfills and tests can inject vectors without the
    /// model.
    pub fn put_memory_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != crate::embeddings::EMBEDDING_DIMENSIONS {
            return Err(StoreError::Validation(format!(
                "embedding must have {} dimensions, got {}",
                crate::embeddings::EMBEDDING_DIMENSIONS,
                vector.len()
            )));
        }

        let blob = crate::storage::embedding_to_bytes(vector);
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO memory_vec (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                params![id, blob],
            )?;
        }

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.memory_index()?;
            if let Err(e) = index.add(id, vector) {
                tracing::warn!("Failed to index memory {}: {}", id, e);
            }
        }

        Ok(())
    }

    /// Hybrid recall: keyword + vector fusion with the decay multiplier.
    ///
    /// The two sides run concurrently; if the vector side fails (no model,
    /// index error) the keyword results are returned alone.
    pub fn recall(&self, input: RecallInput) -> Result<Vec<RecallHit>> {
        let limit = input.limit.clamp(1, 100);
        let overfetch = limit * VEC_OVERFETCH;
        let vector_weight = input.vector_weight.unwrap_or(DEFAULT_VECTOR_WEIGHT);
        let keyword_weight = input.keyword_weight.unwrap_or(DEFAULT_KEYWORD_WEIGHT);

        let query_vec = self.embed_query(&input.query);

        let (vector_raw, keyword_raw) = std::thread::scope(|scope| {
            let keyword_handle =
                scope.spawn(|| self.keyword_search_memories(&input.query, overfetch));
            let vector_raw = match &query_vec {
                Some(v) => self.vector_search_memories(v, overfetch),
                None => Ok(vec![]),
            };
            let keyword_raw = keyword_handle
                .join()
                .unwrap_or_else(|_| Err(StoreError::Init("keyword search panicked".into())));
            (vector_raw, keyword_raw)
        });

        // Partial failure: the vector side degrades silently to keyword-only
        let vector_raw = vector_raw.unwrap_or_else(|e| {
            tracing::warn!("Vector search failed, returning keyword-only results: {}", e);
            vec![]
        });
        let keyword_raw = keyword_raw?;

        let vector_norm = normalize_lower_is_better(&vector_raw);
        let keyword_norm = normalize_lower_is_better(&keyword_raw);
        let fused = fuse_weighted(&vector_norm, &keyword_norm, vector_weight, keyword_weight);

        let vector_by_id: std::collections::HashMap<&str, f32> =
            vector_norm.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        let keyword_by_id: std::collections::HashMap<&str, f32> =
            keyword_norm.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        let now = Utc::now();
        let mut hits = Vec::new();
        for (id, fused_score) in &fused {
            let Some(memory) = self.get_memory(id)? else {
                continue;
            };
            if let Some(cat) = &input.category {
                if &memory.category != cat {
                    continue;
                }
            }
            let decay = decay::decay_multiplier(
                memory.created_at,
                memory.importance,
                memory.access_count,
                memory.last_accessed,
                now,
            );
            hits.push(RecallHit {
                score: (fused_score * decay as f32).clamp(0.0, 1.0),
                vector_score: vector_by_id.get(id.as_str()).copied(),
                keyword_score: keyword_by_id.get(id.as_str()).copied(),
                decay,
                archived: false,
                memory,
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        if input.include_archived {
            let mut archived = self.search_archive(&input.query, limit)?;
            hits.append(&mut archived);
            hits.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(limit);
        }

        let live_ids: Vec<&str> = hits
            .iter()
            .filter(|h| !h.archived)
            .map(|h| h.memory.id.as_str())
            .collect();
        self.touch_memories(&live_ids)?;

        Ok(hits)
    }

    /// Recall plus one hop of knowledge-graph expansion.
    pub fn deep_recall(&self, query: &str, limit: usize) -> Result<DeepRecallResult> {
        let hits = self.recall(RecallInput {
            query: query.to_string(),
            limit,
            ..Default::default()
        })?;

        let hit_ids: Vec<&str> = hits.iter().map(|h| h.memory.id.as_str()).collect();
        let entities = self.entities_evidenced_by(&hit_ids)?;

        let mut related = Vec::new();
        let mut seen: std::collections::HashSet<String> =
            hit_ids.iter().map(|id| id.to_string()).collect();
        for entity in &entities {
            for memory_id in &entity.memory_ids {
                if seen.contains(memory_id) {
                    continue;
                }
                if let Some(memory) = self.get_memory(memory_id)? {
                    seen.insert(memory_id.clone());
                    related.push(memory);
                }
            }
        }

        Ok(DeepRecallResult {
            hits,
            entities,
            related_memories: related,
        })
    }

    /// Archive a memory: copy into `memory_archive`, drop the live row and
    /// its vector. Returns false when the id is unknown.
    pub fn forget(&self, id: &str, reason: &str) -> Result<bool> {
        let Some(memory) = self.get_memory(id)? else {
            return Ok(false);
        };

        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO memory_archive
                 (id, content, category, tags, importance, created_at, last_accessed,
                  access_count, session_id, archived_at, archive_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    memory.id,
                    memory.content,
                    memory.category,
                    serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".into()),
                    memory.importance,
                    memory.created_at.to_rfc3339(),
                    memory.last_accessed.map(|t| t.to_rfc3339()),
                    memory.access_count,
                    memory.session_id,
                    now_iso(),
                    reason,
                ],
            )?;
            conn.execute("DELETE FROM memory_vec WHERE id = ?1", [id])?;
            conn.execute("DELETE FROM memories WHERE id = ?1", [id])?;
        }

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.memory_index()?;
            let _ = index.remove(id);
        }

        Ok(true)
    }

    /// Group live memories into similarity clusters over their stored
    /// vectors (single-link, pairwise cosine >= `min_similarity`). Only
    /// clusters with at least two members are returned, members ordered by
    /// importance descending.
    pub fn find_clusters(&self, min_similarity: f32) -> Result<Vec<Vec<Memory>>> {
        let vectors: Vec<(String, Vec<f32>)> = {
            let conn = self.read()?;
            let mut stmt = conn.prepare("SELECT id, embedding FROM memory_vec")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .filter_map(|r| r.ok())
                .filter_map(|(id, blob)| {
                    crate::storage::embedding_from_bytes(&blob).map(|v| (id, v))
                })
                .collect();
            rows
        };

        let n = vectors.len();
        let mut assigned = vec![false; n];
        let mut clusters = Vec::new();

        for start in 0..n {
            if assigned[start] {
                continue;
            }
            let mut members = vec![start];
            assigned[start] = true;
            let mut frontier = vec![start];
            while let Some(current) = frontier.pop() {
                for candidate in 0..n {
                    if assigned[candidate] {
                        continue;
                    }
                    let sim = crate::embeddings::cosine_similarity(
                        &vectors[current].1,
                        &vectors[candidate].1,
                    );
                    if sim >= min_similarity {
                        assigned[candidate] = true;
                        members.push(candidate);
                        frontier.push(candidate);
                    }
                }
            }
            if members.len() >= 2 {
                clusters.push(members);
            }
        }

        let mut result = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let mut memories = Vec::with_capacity(cluster.len());
            for idx in cluster {
                if let Some(memory) = self.get_memory(&vectors[idx].0)? {
                    memories.push(memory);
                }
            }
            memories.sort_by(|a, b| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if memories.len() >= 2 {
                result.push(memories);
            }
        }
        Ok(result)
    }

    /// Merge near-duplicate clusters: keep the highest-importance member
    /// live, archive the rest. `dry_run` returns the plan without mutating.
    pub fn consolidate(&self, min_similarity: f32, dry_run: bool) -> Result<ConsolidationReport> {
        let clusters = self.find_clusters(min_similarity)?;
        let mut merges = Vec::new();
        let mut archived_count = 0;

        for cluster in clusters {
            let kept = &cluster[0];
            let archived_ids: Vec<String> =
                cluster[1..].iter().map(|m| m.id.clone()).collect();
            if !dry_run {
                for id in &archived_ids {
                    let reason = format!("consolidated into {}", kept.id);
                    self.forget(id, &reason)?;
                }
            }
            archived_count += archived_ids.len();
            merges.push(ClusterMerge {
                kept_id: kept.id.clone(),
                archived_ids,
            });
        }

        Ok(ConsolidationReport {
            merges,
            archived_count,
            dry_run,
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn keyword_search_memories(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let sanitized = sanitize_match_query(query);
        if sanitized.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, bm25(memories_fts) FROM memories_fts
             WHERE memories_fts MATCH ?1 ORDER BY bm25(memories_fts) LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![sanitized, k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)? as f32))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    #[cfg(feature = "vector-search")]
    fn vector_search_memories(&self, query_vec: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let index = self.memory_index()?;
        index
            .search(query_vec, k)
            .map_err(|e| StoreError::Init(format!("vector search failed: {e}")))
    }

    #[cfg(not(feature = "vector-search"))]
    fn vector_search_memories(&self, _query_vec: &[f32], _k: usize) -> Result<Vec<(String, f32)>> {
        Ok(vec![])
    }

    fn search_archive(&self, query: &str, limit: usize) -> Result<Vec<RecallHit>> {
        let needle = format!("%{}%", query.trim());
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, category, tags, importance, created_at, last_accessed,
                    access_count, session_id
             FROM memory_archive WHERE content LIKE ?1 LIMIT ?2",
        )?;
        let now = Utc::now();
        let rows = stmt
            .query_map(params![needle, limit as i64], |row| row_to_memory(row))?
            .filter_map(|r| r.ok())
            .map(|memory| {
                let decay = decay::decay_multiplier(
                    memory.created_at,
                    memory.importance,
                    memory.access_count,
                    memory.last_accessed,
                    now,
                );
                RecallHit {
                    score: (decay as f32 * DEFAULT_KEYWORD_WEIGHT).clamp(0.0, 1.0),
                    vector_score: None,
                    keyword_score: None,
                    decay,
                    archived: true,
                    memory,
                }
            })
            .collect();
        Ok(rows)
    }

    fn touch_memories(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = now_iso();
        let conn = self.write()?;
        for id in ids {
            conn.execute(
                "UPDATE memories SET last_accessed = ?1, access_count = access_count + 1
                 WHERE id = ?2",
                params![now, id],
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    fn basis_vector(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; crate::embeddings::EMBEDDING_DIMENSIONS];
        v[axis] = 1.0;
        v
    }

    /// Unit vector close to `axis` (cosine ~0.995 against the basis vector)
    fn near_vector(axis: usize, other: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; crate::embeddings::EMBEDDING_DIMENSIONS];
        v[axis] = 1.0;
        v[other] = 0.1;
        crate::embeddings::l2_normalize(&mut v);
        v
    }

    fn remember(store: &Store, content: &str) -> Memory {
        store
            .remember(RememberInput {
                content: content.to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_remember_rejects_empty_content() {
        let (store, _dir) = test_store();
        let err = store.remember(RememberInput::default()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_remember_rejects_unknown_category() {
        let (store, _dir) = test_store();
        let err = store
            .remember(RememberInput {
                content: "x".into(),
                category: "banana".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_remember_clamps_importance() {
        let (store, _dir) = test_store();
        let memory = store
            .remember(RememberInput {
                content: "importance clamp".into(),
                importance: Some(4.2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(memory.importance, 1.0);
    }

    #[test]
    fn test_keyword_recall_finds_content() {
        let (store, _dir) = test_store();
        let memory = remember(&store, "The borrow checker enforces aliasing rules");
        remember(&store, "Completely unrelated gardening note");

        let hits = store
            .recall(RecallInput {
                query: "borrow checker".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].memory.id, memory.id);
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.score));
        }
    }

    #[test]
    fn test_recall_garbage_query_returns_empty() {
        let (store, _dir) = test_store();
        remember(&store, "something");
        let hits = store
            .recall(RecallInput {
                query: "!!! ---".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_recall_bumps_access_count() {
        let (store, _dir) = test_store();
        let memory = remember(&store, "access counting memo");
        store
            .recall(RecallInput {
                query: "access counting".into(),
                ..Default::default()
            })
            .unwrap();
        let after = store.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(after.access_count, 1);
        assert!(after.last_accessed.is_some());
    }

    #[test]
    fn test_recall_category_filter() {
        let (store, _dir) = test_store();
        store
            .remember(RememberInput {
                content: "prefers dark roast coffee".into(),
                category: "preference".into(),
                ..Default::default()
            })
            .unwrap();

        let hits = store
            .recall(RecallInput {
                query: "coffee".into(),
                category: Some("decision".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(hits.is_empty());

        let hits = store
            .recall(RecallInput {
                query: "coffee".into(),
                category: Some("preference".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_forget_archives_and_removes() {
        let (store, _dir) = test_store();
        let memory = remember(&store, "soon to be archived");

        assert!(store.forget(&memory.id, "test cleanup").unwrap());
        assert!(store.get_memory(&memory.id).unwrap().is_none());

        // Archive keeps the content unchanged
        let conn = store.read().unwrap();
        let (content, reason): (String, String) = conn
            .query_row(
                "SELECT content, archive_reason FROM memory_archive WHERE id = ?1",
                [&memory.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(content, "soon to be archived");
        assert_eq!(reason, "test cleanup");
    }

    #[test]
    fn test_forget_unknown_id_is_false() {
        let (store, _dir) = test_store();
        assert!(!store.forget("000000000000", "nope").unwrap());
    }

    #[test]
    fn test_find_clusters_groups_similar_vectors() {
        let (store, _dir) = test_store();
        let a = remember(&store, "Python is great for ML");
        let b = remember(&store, "Python works well for machine learning");
        let c = remember(&store, "Python excels at ML tasks");
        let d = remember(&store, "SQL databases use tables");

        // Synthetic vectors: three near-identical, one orthogonal
        store.put_memory_embedding(&a.id, &basis_vector(0)).unwrap();
        store.put_memory_embedding(&b.id, &near_vector(0, 1)).unwrap();
        store.put_memory_embedding(&c.id, &near_vector(0, 2)).unwrap();
        store.put_memory_embedding(&d.id, &basis_vector(5)).unwrap();

        let clusters = store.find_clusters(0.95).unwrap();
        assert_eq!(clusters.len(), 1);
        let ids: Vec<&str> = clusters[0].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&a.id.as_str()));
        assert!(ids.contains(&b.id.as_str()));
        assert!(ids.contains(&c.id.as_str()));
        assert!(!ids.contains(&d.id.as_str()));
    }

    #[test]
    fn test_consolidate_keeps_most_important() {
        let (store, _dir) = test_store();
        let keep = store
            .remember(RememberInput {
                content: "canonical fact".into(),
                importance: Some(0.9),
                ..Default::default()
            })
            .unwrap();
        let drop = store
            .remember(RememberInput {
                content: "duplicate fact".into(),
                importance: Some(0.2),
                ..Default::default()
            })
            .unwrap();
        store.put_memory_embedding(&keep.id, &basis_vector(0)).unwrap();
        store.put_memory_embedding(&drop.id, &near_vector(0, 1)).unwrap();

        // Dry run changes nothing
        let plan = store.consolidate(0.9, true).unwrap();
        assert_eq!(plan.archived_count, 1);
        assert!(store.get_memory(&drop.id).unwrap().is_some());

        let report = store.consolidate(0.9, false).unwrap();
        assert_eq!(report.merges.len(), 1);
        assert_eq!(report.merges[0].kept_id, keep.id);
        assert!(store.get_memory(&keep.id).unwrap().is_some());
        assert!(store.get_memory(&drop.id).unwrap().is_none());
    }

    #[test]
    fn test_include_archived_surfaces_archive_hits() {
        let (store, _dir) = test_store();
        let memory = remember(&store, "archived but still findable fact");
        store.forget(&memory.id, "archived").unwrap();

        let hits = store
            .recall(RecallInput {
                query: "findable".into(),
                include_archived: true,
                ..Default::default()
            })
            .unwrap();
        assert!(hits.iter().any(|h| h.archived && h.memory.id == memory.id));
    }
}
