//! Knowledge Entries
//!
//! Curated reference entries: the durable twin of memories. Same hybrid
//! keyword+vector retrieval, but no decay — knowledge does not rot, it is
//! edited.

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

/// A knowledge entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A knowledge search hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeHit {
    pub entry: KnowledgeEntry,
    pub score: f32,
    pub vector_score: Option<f32>,
    pub keyword_score: Option<f32>,
}

/// Typed update record for [`Store::update_knowledge`]; the column allowlist
/// lives next to this in `storage::allowed_columns`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub source: Option<String>,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    let tags: String = row.get("tags")?;
    Ok(KnowledgeEntry {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        category: row.get("category")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        source: row.get("source")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const KNOWLEDGE_COLUMNS: &str = "id, title, content, category, tags, source, created_at, updated_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Store a knowledge entry, embedding title + content when possible.
    pub fn knowledge_store(
        &self,
        title: &str,
        content: &str,
        category: &str,
        tags: &[String],
        source: &str,
    ) -> Result<KnowledgeEntry> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(StoreError::Validation(
                "knowledge title and content are required".into(),
            ));
        }

        let id = short_id();
        let now = now_iso();
        let category = if category.is_empty() { "general" } else { category };
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO knowledge (id, title, content, category, tags, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    title,
                    content,
                    category,
                    serde_json::to_string(tags).unwrap_or_else(|_| "[]".into()),
                    source,
                    now,
                ],
            )?;
        }

        let embed_input = format!("{title}\n{content}");
        if let Some(vector) = crate::embeddings::embed_text(&embed_input) {
            self.put_knowledge_embedding(&id, &vector)?;
        }

        self.get_knowledge(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a knowledge entry by id.
    pub fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let conn = self.read()?;
        let entry = conn
            .query_row(
                &format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE id = ?1"),
                [id],
                |row| row_to_entry(row),
            )
            .optional()?;
        Ok(entry)
    }

    /// List entries, newest first.
    pub fn list_knowledge(&self, category: Option<&str>, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let conn = self.read()?;
        let mut entries = Vec::new();
        match category {
            Some(cat) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE category = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![cat, limit as i64], |row| row_to_entry(row))?;
                for row in rows {
                    entries.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge ORDER BY created_at DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit as i64], |row| row_to_entry(row))?;
                for row in rows {
                    entries.push(row?);
                }
            }
        }
        Ok(entries)
    }

    /// Update fields through the allowlist-gated helper, then re-embed if the
    /// text changed.
    pub fn update_knowledge(&self, id: &str, update: KnowledgeUpdate) -> Result<Option<KnowledgeEntry>> {
        if self.get_knowledge(id)?.is_none() {
            return Ok(None);
        }

        let mut fields: Vec<(&str, serde_json::Value)> = Vec::new();
        if let Some(title) = &update.title {
            fields.push(("title", serde_json::json!(title)));
        }
        if let Some(content) = &update.content {
            fields.push(("content", serde_json::json!(content)));
        }
        if let Some(category) = &update.category {
            fields.push(("category", serde_json::json!(category)));
        }
        if let Some(tags) = &update.tags {
            fields.push(("tags", serde_json::json!(tags)));
        }
        if let Some(source) = &update.source {
            fields.push(("source", serde_json::json!(source)));
        }
        if fields.is_empty() {
            return Err(StoreError::Validation("no fields to update".into()));
        }
        fields.push(("updated_at", serde_json::json!(now_iso())));

        self.update_row("knowledge", id, &fields)?;

        if update.title.is_some() || update.content.is_some() {
            if let Some(entry) = self.get_knowledge(id)? {
                let embed_input = format!("{}\n{}", entry.title, entry.content);
                if let Some(vector) = crate::embeddings::embed_text(&embed_input) {
                    self.put_knowledge_embedding(id, &vector)?;
                }
            }
        }

        self.get_knowledge(id)
    }

    /// Upsert the embedding for an entry and mirror it into the K-NN index.
    pub fn put_knowledge_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
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
                "INSERT INTO knowledge_vec (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                params![id, blob],
            )?;
        }
        #[cfg(feature = "vector-search")]
        {
            let mut index = self.knowledge_index()?;
            if let Err(e) = index.add(id, vector) {
                tracing::warn!("Failed to index knowledge {}: {}", id, e);
            }
        }
        Ok(())
    }

    /// Hybrid search over knowledge entries (no decay multiplier).
    pub fn search_knowledge(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let limit = limit.clamp(1, 100);
        let overfetch = limit * VEC_OVERFETCH;
        let query_vec = self.embed_query(query);

        let vector_raw = match &query_vec {
            Some(v) => self.vector_search_knowledge(v, overfetch).unwrap_or_else(|e| {
                tracing::warn!("Knowledge vector search failed: {}", e);
                vec![]
            }),
            None => vec![],
        };

        let keyword_raw = {
            let sanitized = sanitize_match_query(query);
            if sanitized.is_empty() {
                vec![]
            } else {
                let conn = self.read()?;
                let mut stmt = conn.prepare(
                    "SELECT id, bm25(knowledge_fts) FROM knowledge_fts
                     WHERE knowledge_fts MATCH ?1 ORDER BY bm25(knowledge_fts) LIMIT ?2",
                )?;
                stmt.query_map(params![sanitized, overfetch as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)? as f32))
                })?
                .filter_map(|r| r.ok())
                .collect()
            }
        };

        let vector_norm = normalize_lower_is_better(&vector_raw);
        let keyword_norm = normalize_lower_is_better(&keyword_raw);
        let fused = fuse_weighted(
            &vector_norm,
            &keyword_norm,
            DEFAULT_VECTOR_WEIGHT,
            DEFAULT_KEYWORD_WEIGHT,
        );

        let vector_by_id: std::collections::HashMap<&str, f32> =
            vector_norm.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        let keyword_by_id: std::collections::HashMap<&str, f32> =
            keyword_norm.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        let mut hits = Vec::new();
        for (id, score) in fused {
            let Some(entry) = self.get_knowledge(&id)? else {
                continue;
            };
            if let Some(cat) = category {
                if entry.category != cat {
                    continue;
                }
            }
            hits.push(KnowledgeHit {
                score,
                vector_score: vector_by_id.get(id.as_str()).copied(),
                keyword_score: keyword_by_id.get(id.as_str()).copied(),
                entry,
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    #[cfg(feature = "vector-search")]
    fn vector_search_knowledge(&self, query_vec: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let index = self.knowledge_index()?;
        index
            .search(query_vec, k)
            .map_err(|e| StoreError::Init(format!("vector search failed: {e}")))
    }

    #[cfg(not(feature = "vector-search"))]
    fn vector_search_knowledge(&self, _query_vec: &[f32], _k: usize) -> Result<Vec<(String, f32)>> {
        Ok(vec![])
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

    #[test]
    fn test_store_and_search() {
        let (store, _dir) = test_store();
        let entry = store
            .knowledge_store(
                "WAL mode",
                "Write-ahead logging lets readers proceed during writes",
                "sqlite",
                &["db".into()],
                "docs",
            )
            .unwrap();

        let hits = store.search_knowledge("write-ahead logging", None, 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entry.id, entry.id);
    }

    #[test]
    fn test_store_rejects_blank_title() {
        let (store, _dir) = test_store();
        let err = store
            .knowledge_store("  ", "content", "", &[], "")
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_update_changes_fields_and_bumps_updated_at() {
        let (store, _dir) = test_store();
        let entry = store
            .knowledge_store("Title", "Original content", "general", &[], "")
            .unwrap();

        let updated = store
            .update_knowledge(
                &entry.id,
                KnowledgeUpdate {
                    content: Some("Revised content".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "Revised content");
        assert!(updated.updated_at >= entry.updated_at);
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let (store, _dir) = test_store();
        let result = store
            .update_knowledge(
                "000000000000",
                KnowledgeUpdate {
                    content: Some("x".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_update_with_no_fields_is_validation_error() {
        let (store, _dir) = test_store();
        let entry = store
            .knowledge_store("Title", "Content", "", &[], "")
            .unwrap();
        let err = store
            .update_knowledge(&entry.id, KnowledgeUpdate::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_category_filter() {
        let (store, _dir) = test_store();
        store
            .knowledge_store("Entry A", "tokio runtime notes", "rust", &[], "")
            .unwrap();
        let hits = store
            .search_knowledge("tokio runtime", Some("python"), 5)
            .unwrap();
        assert!(hits.is_empty());
    }
}
