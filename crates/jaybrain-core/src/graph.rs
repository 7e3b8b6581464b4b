//! Knowledge Graph
//!
//! Typed entities and typed weighted relationships with merge-on-conflict
//! upserts, plus BFS neighborhood traversal. Cycles are fine: the graph is
//! stored as id rows and traversed with a visited set, never as pointers.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, short_id, Result, Store};

/// Depth cap for neighborhood traversal
pub const GRAPH_MAX_DEPTH: usize = 3;

/// Default traversal depth
pub const GRAPH_DEFAULT_DEPTH: usize = 1;

// ============================================================================
// TYPES
// ============================================================================

/// A graph entity (person, project, tool, skill, concept, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub aliases: Vec<String>,
    /// Memories providing evidence for this entity
    pub memory_ids: Vec<String>,
    /// Opaque key-value properties
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A typed, weighted edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub rel_type: String,
    pub weight: f64,
    pub evidence_ids: Vec<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an entity upsert
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpsert {
    /// "created" or "updated"
    pub status: String,
    pub entity: GraphEntity,
}

/// Outcome of a relationship upsert, or a structured miss
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum RelationshipUpsert {
    /// Missing endpoint — reported as data, not as an error
    Missing { error: String },
    /// Stored edge
    Stored {
        status: String,
        relationship: GraphRelationship,
        source: String,
        target: String,
    },
}

/// BFS neighborhood around a center entity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighborhood {
    pub center: GraphEntity,
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<GraphRelationship>,
    pub depth: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEntity> {
    let aliases: String = row.get("aliases")?;
    let memory_ids: String = row.get("memory_ids")?;
    let properties: String = row.get("properties")?;
    Ok(GraphEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: row.get("entity_type")?,
        description: row.get("description")?,
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
        memory_ids: serde_json::from_str(&memory_ids).unwrap_or_default(),
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphRelationship> {
    let evidence: String = row.get("evidence_ids")?;
    let properties: String = row.get("properties")?;
    Ok(GraphRelationship {
        id: row.get("id")?,
        source_entity_id: row.get("source_entity_id")?,
        target_entity_id: row.get("target_entity_id")?,
        rel_type: row.get("rel_type")?,
        weight: row.get("weight")?,
        evidence_ids: serde_json::from_str(&evidence).unwrap_or_default(),
        properties: serde_json::from_str(&properties).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const ENTITY_COLUMNS: &str =
    "id, name, entity_type, description, aliases, memory_ids, properties, created_at, updated_at";
const REL_COLUMNS: &str = "id, source_entity_id, target_entity_id, rel_type, weight, evidence_ids, properties, created_at, updated_at";

/// Merge two string lists as a sorted, deduplicated union.
fn union_sorted(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut set: std::collections::BTreeSet<String> = existing.iter().cloned().collect();
    set.extend(incoming.iter().cloned());
    set.into_iter().collect()
}

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Add or merge an entity, keyed on `(name, entity_type)`.
    ///
    /// On conflict: aliases and memory_ids become the union, properties
    /// shallow-merge (incoming wins per key), description is overwritten only
    /// when the argument is non-empty.
    pub fn add_entity(
        &self,
        name: &str,
        entity_type: &str,
        description: &str,
        aliases: &[String],
        memory_ids: &[String],
        properties: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<EntityUpsert> {
        if name.trim().is_empty() || entity_type.trim().is_empty() {
            return Err(crate::storage::StoreError::Validation(
                "entity name and type are required".into(),
            ));
        }

        if let Some(existing) = self.get_entity_by_name(name, Some(entity_type))? {
            let merged_aliases = union_sorted(&existing.aliases, aliases);
            let merged_memory_ids = union_sorted(&existing.memory_ids, memory_ids);
            let mut merged_props = existing.properties.clone();
            if let Some(incoming) = properties {
                for (k, v) in incoming {
                    merged_props.insert(k.clone(), v.clone());
                }
            }
            let new_description = if description.is_empty() {
                existing.description.clone()
            } else {
                description.to_string()
            };

            {
                let conn = self.write()?;
                conn.execute(
                    "UPDATE graph_entities
                     SET description = ?1, aliases = ?2, memory_ids = ?3, properties = ?4, updated_at = ?5
                     WHERE id = ?6",
                    params![
                        new_description,
                        serde_json::to_string(&merged_aliases).unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&merged_memory_ids).unwrap_or_else(|_| "[]".into()),
                        serde_json::Value::Object(merged_props).to_string(),
                        now_iso(),
                        existing.id,
                    ],
                )?;
            }

            let entity = self
                .get_entity(&existing.id)?
                .ok_or_else(|| crate::storage::StoreError::NotFound(existing.id.clone()))?;
            return Ok(EntityUpsert {
                status: "updated".into(),
                entity,
            });
        }

        let id = short_id();
        let now = now_iso();
        let props = properties
            .map(|p| serde_json::Value::Object(p.clone()).to_string())
            .unwrap_or_else(|| "{}".into());
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO graph_entities
                 (id, name, entity_type, description, aliases, memory_ids, properties, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    name,
                    entity_type,
                    description,
                    serde_json::to_string(&union_sorted(&[], aliases)).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&union_sorted(&[], memory_ids)).unwrap_or_else(|_| "[]".into()),
                    props,
                    now,
                ],
            )?;
        }

        let entity = self
            .get_entity(&id)?
            .ok_or_else(|| crate::storage::StoreError::NotFound(id.clone()))?;
        Ok(EntityUpsert {
            status: "created".into(),
            entity,
        })
    }

    /// Fetch an entity by id.
    pub fn get_entity(&self, id: &str) -> Result<Option<GraphEntity>> {
        let conn = self.read()?;
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE id = ?1"),
                [id],
                |row| row_to_entity(row),
            )
            .optional()?;
        Ok(entity)
    }

    /// Fetch an entity by exact name, optionally constrained to a type.
    pub fn get_entity_by_name(
        &self,
        name: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<GraphEntity>> {
        let conn = self.read()?;
        let entity = match entity_type {
            Some(et) => conn
                .query_row(
                    &format!(
                        "SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE name = ?1 AND entity_type = ?2"
                    ),
                    params![name, et],
                    |row| row_to_entity(row),
                )
                .optional()?,
            None => conn
                .query_row(
                    &format!("SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE name = ?1"),
                    [name],
                    |row| row_to_entity(row),
                )
                .optional()?,
        };
        Ok(entity)
    }

    /// Add or merge a relationship, keyed on `(source, target, rel_type)`.
    /// Endpoints resolve by id first, then by unique name. A missing endpoint
    /// is a structured miss, not an error.
    pub fn add_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        weight: f64,
        evidence_ids: &[String],
        properties: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<RelationshipUpsert> {
        let Some(source_entity) = self.resolve_entity(source)? else {
            return Ok(RelationshipUpsert::Missing {
                error: format!("Source entity not found: {source}"),
            });
        };
        let Some(target_entity) = self.resolve_entity(target)? else {
            return Ok(RelationshipUpsert::Missing {
                error: format!("Target entity not found: {target}"),
            });
        };

        let weight = weight.clamp(0.0, 1.0);

        let existing = {
            let conn = self.read()?;
            conn.query_row(
                &format!(
                    "SELECT {REL_COLUMNS} FROM graph_relationships
                     WHERE source_entity_id = ?1 AND target_entity_id = ?2 AND rel_type = ?3"
                ),
                params![source_entity.id, target_entity.id, rel_type],
                |row| row_to_relationship(row),
            )
            .optional()?
        };

        let (status, rel_id) = match existing {
            Some(rel) => {
                let merged_evidence = union_sorted(&rel.evidence_ids, evidence_ids);
                let mut merged_props = rel.properties.clone();
                if let Some(incoming) = properties {
                    for (k, v) in incoming {
                        merged_props.insert(k.clone(), v.clone());
                    }
                }
                let conn = self.write()?;
                conn.execute(
                    "UPDATE graph_relationships
                     SET weight = ?1, evidence_ids = ?2, properties = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        weight,
                        serde_json::to_string(&merged_evidence).unwrap_or_else(|_| "[]".into()),
                        serde_json::Value::Object(merged_props).to_string(),
                        now_iso(),
                        rel.id,
                    ],
                )?;
                ("updated".to_string(), rel.id)
            }
            None => {
                let id = short_id();
                let now = now_iso();
                let props = properties
                    .map(|p| serde_json::Value::Object(p.clone()).to_string())
                    .unwrap_or_else(|| "{}".into());
                let conn = self.write()?;
                conn.execute(
                    "INSERT INTO graph_relationships
                     (id, source_entity_id, target_entity_id, rel_type, weight, evidence_ids, properties, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        id,
                        source_entity.id,
                        target_entity.id,
                        rel_type,
                        weight,
                        serde_json::to_string(&union_sorted(&[], evidence_ids))
                            .unwrap_or_else(|_| "[]".into()),
                        props,
                        now,
                    ],
                )?;
                ("created".to_string(), id)
            }
        };

        let relationship = {
            let conn = self.read()?;
            conn.query_row(
                &format!("SELECT {REL_COLUMNS} FROM graph_relationships WHERE id = ?1"),
                [&rel_id],
                |row| row_to_relationship(row),
            )?
        };

        Ok(RelationshipUpsert::Stored {
            status,
            relationship,
            source: source_entity.name,
            target: target_entity.name,
        })
    }

    /// BFS neighborhood around `center` (id or name), depth capped at
    /// [`GRAPH_MAX_DEPTH`]. Each entity is visited once; every edge touched
    /// is included even when its far endpoint was already visited.
    pub fn query_neighborhood(
        &self,
        center: &str,
        depth: usize,
        entity_type: Option<&str>,
    ) -> Result<Option<Neighborhood>> {
        let depth = depth.min(GRAPH_MAX_DEPTH);

        let center_entity = match self.get_entity_by_name(center, entity_type)? {
            Some(e) => Some(e),
            None => self.get_entity(center)?,
        };
        let Some(center_entity) = center_entity else {
            return Ok(None);
        };

        let mut visited: HashMap<String, GraphEntity> = HashMap::new();
        visited.insert(center_entity.id.clone(), center_entity.clone());
        let mut edges: Vec<GraphRelationship> = Vec::new();
        let mut edge_ids: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::from([center_entity.id.clone()]);

        for _ in 0..depth {
            let mut next_frontier: VecDeque<String> = VecDeque::new();
            while let Some(entity_id) = frontier.pop_front() {
                for rel in self.entity_relationships(&entity_id)? {
                    if edge_ids.insert(rel.id.clone()) {
                        edges.push(rel.clone());
                    }
                    let neighbor_id = if rel.source_entity_id == entity_id {
                        rel.target_entity_id.clone()
                    } else {
                        rel.source_entity_id.clone()
                    };
                    if !visited.contains_key(&neighbor_id) {
                        if let Some(neighbor) = self.get_entity(&neighbor_id)? {
                            visited.insert(neighbor_id.clone(), neighbor);
                            next_frontier.push_back(neighbor_id);
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        let entity_count = visited.len();
        let relationship_count = edges.len();
        Ok(Some(Neighborhood {
            center: center_entity,
            entities: visited.into_values().collect(),
            relationships: edges,
            depth,
            entity_count,
            relationship_count,
        }))
    }

    /// Case-insensitive substring search on entity names.
    pub fn search_entities(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphEntity>> {
        let needle = format!("%{}%", query.to_lowercase());
        let conn = self.read()?;
        let mut entities = Vec::new();
        match entity_type {
            Some(et) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE lower(name) LIKE ?1 AND entity_type = ?2
                     ORDER BY name LIMIT ?3"
                ))?;
                let rows = stmt.query_map(params![needle, et, limit as i64], |row| {
                    row_to_entity(row)
                })?;
                for row in rows {
                    entities.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities
                     WHERE lower(name) LIKE ?1 ORDER BY name LIMIT ?2"
                ))?;
                let rows =
                    stmt.query_map(params![needle, limit as i64], |row| row_to_entity(row))?;
                for row in rows {
                    entities.push(row?);
                }
            }
        }
        Ok(entities)
    }

    /// List entities, optionally filtered by type.
    pub fn list_entities(
        &self,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphEntity>> {
        let conn = self.read()?;
        let mut entities = Vec::new();
        match entity_type {
            Some(et) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE entity_type = ?1
                     ORDER BY name LIMIT ?2"
                ))?;
                let rows =
                    stmt.query_map(params![et, limit as i64], |row| row_to_entity(row))?;
                for row in rows {
                    entities.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM graph_entities ORDER BY name LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit as i64], |row| row_to_entity(row))?;
                for row in rows {
                    entities.push(row?);
                }
            }
        }
        Ok(entities)
    }

    /// Entities whose evidence lists mention any of the given memory ids.
    pub(crate) fn entities_evidenced_by(&self, memory_ids: &[&str]) -> Result<Vec<GraphEntity>> {
        if memory_ids.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE memory_ids != '[]'"
        ))?;
        let candidates: Vec<GraphEntity> = stmt
            .query_map([], |row| row_to_entity(row))?
            .filter_map(|r| r.ok())
            .collect();

        let wanted: HashSet<&str> = memory_ids.iter().copied().collect();
        Ok(candidates
            .into_iter()
            .filter(|e| e.memory_ids.iter().any(|id| wanted.contains(id.as_str())))
            .collect())
    }

    /// Resolve an entity reference: id first, then unique name.
    fn resolve_entity(&self, reference: &str) -> Result<Option<GraphEntity>> {
        if let Some(entity) = self.get_entity(reference)? {
            return Ok(Some(entity));
        }
        self.get_entity_by_name(reference, None)
    }

    /// All edges touching an entity, in either direction.
    fn entity_relationships(&self, entity_id: &str) -> Result<Vec<GraphRelationship>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships
             WHERE source_entity_id = ?1 OR target_entity_id = ?1"
        ))?;
        let rows = stmt
            .query_map([entity_id], |row| row_to_relationship(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
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

    fn add(store: &Store, name: &str, entity_type: &str) -> GraphEntity {
        store
            .add_entity(name, entity_type, "", &[], &[], None)
            .unwrap()
            .entity
    }

    #[test]
    fn test_add_entity_creates_then_merges() {
        let (store, _dir) = test_store();

        let first = store
            .add_entity(
                "Rust",
                "skill",
                "systems language",
                &["rustlang".into()],
                &["abc123def456".into()],
                None,
            )
            .unwrap();
        assert_eq!(first.status, "created");

        let second = store
            .add_entity(
                "Rust",
                "skill",
                "",
                &["rs".into(), "rustlang".into()],
                &["fedcba654321".into()],
                None,
            )
            .unwrap();
        assert_eq!(second.status, "updated");
        assert_eq!(second.entity.id, first.entity.id);
        // Union of aliases, original description kept
        assert_eq!(second.entity.aliases, vec!["rs", "rustlang"]);
        assert_eq!(second.entity.description, "systems language");
        assert_eq!(second.entity.memory_ids.len(), 2);
    }

    #[test]
    fn test_same_name_different_type_is_distinct() {
        let (store, _dir) = test_store();
        let a = add(&store, "Mercury", "project");
        let b = add(&store, "Mercury", "concept");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_properties_shallow_merge() {
        let (store, _dir) = test_store();
        let mut props = serde_json::Map::new();
        props.insert("team".into(), serde_json::json!("infra"));
        props.insert("stars".into(), serde_json::json!(1));
        store
            .add_entity("Repo", "project", "", &[], &[], Some(&props))
            .unwrap();

        let mut update = serde_json::Map::new();
        update.insert("stars".into(), serde_json::json!(2));
        let merged = store
            .add_entity("Repo", "project", "", &[], &[], Some(&update))
            .unwrap();
        assert_eq!(merged.entity.properties["team"], serde_json::json!("infra"));
        assert_eq!(merged.entity.properties["stars"], serde_json::json!(2));
    }

    #[test]
    fn test_add_relationship_missing_endpoint_is_structured() {
        let (store, _dir) = test_store();
        add(&store, "Alice", "person");
        let result = store
            .add_relationship("Alice", "Ghost", "knows", 0.5, &[], None)
            .unwrap();
        match result {
            RelationshipUpsert::Missing { error } => assert!(error.contains("Ghost")),
            _ => panic!("expected structured miss"),
        }
    }

    #[test]
    fn test_add_relationship_merges_on_triple() {
        let (store, _dir) = test_store();
        add(&store, "Alice", "person");
        add(&store, "Bob", "person");

        let first = store
            .add_relationship("Alice", "Bob", "works_with", 0.4, &["m1".into()], None)
            .unwrap();
        let RelationshipUpsert::Stored { status, .. } = &first else {
            panic!("expected stored edge");
        };
        assert_eq!(status, "created");

        let second = store
            .add_relationship("Alice", "Bob", "works_with", 0.9, &["m2".into()], None)
            .unwrap();
        let RelationshipUpsert::Stored {
            status,
            relationship,
            ..
        } = second
        else {
            panic!("expected stored edge");
        };
        assert_eq!(status, "updated");
        assert_eq!(relationship.weight, 0.9);
        assert_eq!(relationship.evidence_ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_neighborhood_bfs_with_cycle() {
        let (store, _dir) = test_store();
        add(&store, "A", "concept");
        add(&store, "B", "concept");
        add(&store, "C", "concept");
        store.add_relationship("A", "B", "linked", 1.0, &[], None).unwrap();
        store.add_relationship("B", "C", "linked", 1.0, &[], None).unwrap();
        store.add_relationship("C", "A", "linked", 1.0, &[], None).unwrap();

        let hood = store.query_neighborhood("A", 2, None).unwrap().unwrap();
        assert_eq!(hood.entity_count, 3);
        assert_eq!(hood.relationship_count, 3);

        // Depth 1 sees both neighbors (cycle edge C->A counts as touching A)
        let close = store.query_neighborhood("A", 1, None).unwrap().unwrap();
        assert_eq!(close.entity_count, 3);
    }

    #[test]
    fn test_neighborhood_depth_is_capped() {
        let (store, _dir) = test_store();
        add(&store, "A", "concept");
        let hood = store.query_neighborhood("A", 99, None).unwrap().unwrap();
        assert_eq!(hood.depth, GRAPH_MAX_DEPTH);
    }

    #[test]
    fn test_neighborhood_unknown_center_is_none() {
        let (store, _dir) = test_store();
        assert!(store.query_neighborhood("Nobody", 1, None).unwrap().is_none());
    }

    #[test]
    fn test_search_entities_case_insensitive() {
        let (store, _dir) = test_store();
        add(&store, "PostgreSQL", "tool");
        let found = store.search_entities("postgres", None, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "PostgreSQL");
    }

    #[test]
    fn test_list_entities_filters_by_type() {
        let (store, _dir) = test_store();
        add(&store, "Alice", "person");
        add(&store, "Rust", "skill");
        let people = store.list_entities(Some("person"), 10).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Alice");
    }
}
