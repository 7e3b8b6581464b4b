//! Vault Sync
//!
//! Mirrors memories, knowledge entries, and graph entities into a markdown
//! tree, then runs the wiki-link pass: the first few unlinked mentions of a
//! known entity name become `[[Name]]` links, and every entity note gets a
//! Backlinks section listing the notes that point at it. The whole tree is
//! regenerated each sync, so the pass is idempotent.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::storage::{Result, Store};

/// At most this many occurrences of a name get linked per note
const MAX_LINKS_PER_NAME: usize = 3;

/// Names this short are never linked
const MIN_LINK_NAME_LEN: usize = 3;

// ============================================================================
// TYPES
// ============================================================================

/// Sync outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultReport {
    pub notes_written: usize,
    pub links_added: usize,
}

struct Note {
    /// Relative path under the vault
    rel_path: String,
    /// The note's own subject; never self-linked
    subject: String,
    body: String,
}

// ============================================================================
// WIKI LINKS
// ============================================================================

/// Insert `[[Name]]` links for known names into a note body.
///
/// Rules: first [`MAX_LINKS_PER_NAME`] unlinked occurrences per name; an
/// occurrence already inside `[[...]]` stays untouched; the note's own
/// subject is never linked; names shorter than [`MIN_LINK_NAME_LEN`] are
/// skipped. Returns the rewritten body and how many links were added.
pub fn insert_wiki_links(body: &str, names: &[String], own_subject: &str) -> (String, usize) {
    let mut result = body.to_string();
    let mut total_added = 0;

    for name in names {
        if name.len() < MIN_LINK_NAME_LEN || name == own_subject {
            continue;
        }

        let mut added = 0;
        let mut search_from = 0;
        while added < MAX_LINKS_PER_NAME {
            let Some(offset) = result[search_from..].find(name.as_str()) else {
                break;
            };
            let start = search_from + offset;
            let end = start + name.len();

            if is_already_linked(&result, start, end) {
                search_from = end;
                continue;
            }

            result.replace_range(start..end, &format!("[[{name}]]"));
            search_from = end + 4; // the inserted brackets
            added += 1;
        }
        total_added += added;
    }

    (result, total_added)
}

/// Whether `body[start..end]` already sits inside `[[...]]`.
fn is_already_linked(body: &str, start: usize, end: usize) -> bool {
    let before = &body[..start];
    let after = &body[end..];
    before.ends_with("[[") && after.starts_with("]]")
}

// ============================================================================
// SYNC
// ============================================================================

/// Regenerate the vault tree from the store.
pub fn sync_vault(store: &Store, vault_dir: &Path) -> Result<VaultReport> {
    let entity_names: Vec<String> = store
        .list_entities(None, 1000)?
        .into_iter()
        .map(|e| e.name)
        .collect();

    let mut notes = Vec::new();

    for memory in store.list_memories(None, 1000)? {
        let mut body = String::new();
        body.push_str(&format!("# Memory {}\n\n", memory.id));
        body.push_str("---\n");
        body.push_str(&format!("category: {}\n", memory.category));
        body.push_str(&format!("importance: {}\n", memory.importance));
        body.push_str(&format!("created: {}\n", memory.created_at.to_rfc3339()));
        if !memory.tags.is_empty() {
            body.push_str(&format!("tags: {}\n", memory.tags.join(", ")));
        }
        body.push_str("---\n\n");
        body.push_str(&memory.content);
        body.push('\n');
        notes.push(Note {
            rel_path: format!("memories/{}.md", memory.id),
            subject: memory.id.clone(),
            body,
        });
    }

    for entry in store.list_knowledge(None, 1000)? {
        let mut body = String::new();
        body.push_str(&format!("# {}\n\n", entry.title));
        body.push_str("---\n");
        body.push_str(&format!("category: {}\n", entry.category));
        if !entry.source.is_empty() {
            body.push_str(&format!("source: {}\n", entry.source));
        }
        body.push_str("---\n\n");
        body.push_str(&entry.content);
        body.push('\n');
        notes.push(Note {
            rel_path: format!("knowledge/{}.md", entry.id),
            subject: entry.title.clone(),
            body,
        });
    }

    for entity in store.list_entities(None, 1000)? {
        let mut body = String::new();
        body.push_str(&format!("# {}\n\n", entity.name));
        body.push_str(&format!("**Type**: {}\n\n", entity.entity_type));
        if !entity.description.is_empty() {
            body.push_str(&format!("{}\n\n", entity.description));
        }
        if !entity.aliases.is_empty() {
            body.push_str("## Aliases\n\n");
            for alias in &entity.aliases {
                body.push_str(&format!("- {alias}\n"));
            }
            body.push('\n');
        }
        notes.push(Note {
            rel_path: format!("entities/{}.md", sanitize_filename(&entity.name)),
            subject: entity.name.clone(),
            body,
        });
    }

    // Wiki-link pass over every body
    let mut links_added = 0;
    for note in &mut notes {
        let (linked, added) = insert_wiki_links(&note.body, &entity_names, &note.subject);
        note.body = linked;
        links_added += added;
    }

    // Backlinks: entity name -> notes whose body links to it
    let mut backlinks: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for note in &notes {
        for name in &entity_names {
            if *name == note.subject {
                continue;
            }
            if note.body.contains(&format!("[[{name}]]")) {
                backlinks
                    .entry(name.clone())
                    .or_default()
                    .push(note.subject.clone());
            }
        }
    }
    for note in &mut notes {
        if let Some(sources) = backlinks.get(&note.subject) {
            note.body.push_str("\n## Backlinks\n\n");
            for source in sources {
                note.body.push_str(&format!("- [[{source}]]\n"));
            }
        }
    }

    for note in &notes {
        let path = vault_dir.join(&note.rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &note.body)?;
    }

    Ok(VaultReport {
        notes_written: notes.len(),
        links_added,
    })
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RememberInput;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_links_first_three_occurrences() {
        let names = vec!["Rust".to_string()];
        let body = "Rust is fast. Rust is safe. Rust is fun. Rust forever.";
        let (linked, added) = insert_wiki_links(body, &names, "note");
        assert_eq!(added, 3);
        assert_eq!(linked.matches("[[Rust]]").count(), 3);
        // The fourth occurrence stays plain
        assert!(linked.ends_with("Rust forever."));
    }

    #[test]
    fn test_never_rewraps_existing_link() {
        let names = vec!["Rust".to_string()];
        let body = "[[Rust]] is already linked. Rust is not.";
        let (linked, added) = insert_wiki_links(body, &names, "note");
        assert_eq!(added, 1);
        assert!(!linked.contains("[[[[Rust]]]]"));
        assert_eq!(linked.matches("[[Rust]]").count(), 2);
    }

    #[test]
    fn test_never_links_own_subject() {
        let names = vec!["Rust".to_string()];
        let (linked, added) = insert_wiki_links("Rust everywhere", &names, "Rust");
        assert_eq!(added, 0);
        assert_eq!(linked, "Rust everywhere");
    }

    #[test]
    fn test_skips_short_names() {
        let names = vec!["Go".to_string()];
        let (linked, added) = insert_wiki_links("Go is short", &names, "note");
        assert_eq!(added, 0);
        assert_eq!(linked, "Go is short");
    }

    #[test]
    fn test_sync_writes_tree_with_links_and_backlinks() {
        let (store, _dir) = test_store();
        let vault = TempDir::new().unwrap();

        store
            .add_entity("PostgreSQL", "tool", "relational database", &[], &[], None)
            .unwrap();
        store
            .remember(RememberInput {
                content: "Decided to use PostgreSQL for the analytics service".into(),
                category: "decision".into(),
                ..Default::default()
            })
            .unwrap();

        let report = sync_vault(&store, vault.path()).unwrap();
        assert_eq!(report.notes_written, 2);
        assert!(report.links_added >= 1);

        // Memory note got the wiki link
        let memories_dir = vault.path().join("memories");
        let memory_file = std::fs::read_dir(&memories_dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let body = std::fs::read_to_string(memory_file.path()).unwrap();
        assert!(body.contains("[[PostgreSQL]]"));
        // Structure survives: heading + frontmatter fence
        assert!(body.starts_with("# Memory "));
        assert!(body.contains("---\ncategory: decision"));

        // Entity note carries the backlink
        let entity_body =
            std::fs::read_to_string(vault.path().join("entities/PostgreSQL.md")).unwrap();
        assert!(entity_body.contains("## Backlinks"));
        assert!(entity_body.contains("**Type**: tool"));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (store, _dir) = test_store();
        let vault = TempDir::new().unwrap();
        store
            .add_entity("Kubernetes", "tool", "", &[], &[], None)
            .unwrap();
        store
            .remember(RememberInput {
                content: "Kubernetes runs the homelab".into(),
                ..Default::default()
            })
            .unwrap();

        sync_vault(&store, vault.path()).unwrap();
        sync_vault(&store, vault.path()).unwrap();

        let memories_dir = vault.path().join("memories");
        let memory_file = std::fs::read_dir(&memories_dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let body = std::fs::read_to_string(memory_file.path()).unwrap();
        // No double-wrapping after the second pass
        assert_eq!(body.matches("[[Kubernetes]]").count(), 1);
        assert!(!body.contains("[[[["));
    }
}
