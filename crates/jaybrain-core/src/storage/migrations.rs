//! Database Migrations
//!
//! Forward-only schema migration chain for the store. Each step is gated by
//! the `_migrations` table and applied inside an IMMEDIATE transaction so
//! concurrent openers serialise on the write lock; the first writer wins and
//! later openers see an already-current schema.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, tasks, sessions, knowledge, graph, pulse, daemon",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Forge v2: subjects, objectives, review correctness, error patterns",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Auxiliary jobs: trash, feeds, signalforge, shadow snapshots, archive runs",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- ============================================================================
-- MEMORIES (decay-scored long-term store)
-- ============================================================================

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'semantic',
    tags TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    session_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

-- Embeddings live next to the rows as little-endian f32 blobs (384 dims)
CREATE TABLE IF NOT EXISTS memory_vec (
    id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL
);

-- Archived memories keep the full payload but never a vector row
CREATE TABLE IF NOT EXISTS memory_archive (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    session_id TEXT,
    archived_at TEXT NOT NULL,
    archive_reason TEXT NOT NULL DEFAULT ''
);

-- FTS5 keyword index over memories
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    content,
    tags,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

-- ============================================================================
-- TASKS (with the active work queue)
-- ============================================================================

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'todo',
    priority TEXT NOT NULL DEFAULT 'medium',
    project TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    due_date TEXT,
    queue_position INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_queue ON tasks(queue_position);

-- ============================================================================
-- SESSIONS (assistant work sessions, checkpointed before compaction)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT NOT NULL DEFAULT '',
    decisions_made TEXT NOT NULL DEFAULT '[]',
    next_steps TEXT NOT NULL DEFAULT '[]',
    checkpoint_summary TEXT,
    checkpoint_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

-- ============================================================================
-- KNOWLEDGE (curated reference entries, searchable like memories)
-- ============================================================================

CREATE TABLE IF NOT EXISTS knowledge (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    tags TEXT NOT NULL DEFAULT '[]',
    source TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS knowledge_vec (
    id TEXT PRIMARY KEY REFERENCES knowledge(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
    id,
    title,
    content,
    tags,
    content='knowledge',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS knowledge_ai AFTER INSERT ON knowledge BEGIN
    INSERT INTO knowledge_fts(rowid, id, title, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.title, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_ad AFTER DELETE ON knowledge BEGIN
    INSERT INTO knowledge_fts(knowledge_fts, rowid, id, title, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.title, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS knowledge_au AFTER UPDATE ON knowledge BEGIN
    INSERT INTO knowledge_fts(knowledge_fts, rowid, id, title, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.title, OLD.content, OLD.tags);
    INSERT INTO knowledge_fts(rowid, id, title, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.title, NEW.content, NEW.tags);
END;

-- ============================================================================
-- FORGE (spaced-repetition deck, v1 shape)
-- ============================================================================

CREATE TABLE IF NOT EXISTS forge_concepts (
    id TEXT PRIMARY KEY,
    term TEXT NOT NULL,
    definition TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    difficulty TEXT NOT NULL DEFAULT 'beginner',
    bloom_level TEXT NOT NULL DEFAULT 'remember',
    mastery_level REAL NOT NULL DEFAULT 0.0,
    review_count INTEGER NOT NULL DEFAULT 0,
    correct_count INTEGER NOT NULL DEFAULT 0,
    last_reviewed TEXT,
    next_review TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    subject_id TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_forge_next_review ON forge_concepts(next_review);
CREATE INDEX IF NOT EXISTS idx_forge_mastery ON forge_concepts(mastery_level);

CREATE TABLE IF NOT EXISTS forge_streaks (
    date TEXT PRIMARY KEY,
    concepts_reviewed INTEGER NOT NULL DEFAULT 0,
    concepts_added INTEGER NOT NULL DEFAULT 0,
    time_spent_seconds INTEGER NOT NULL DEFAULT 0
);

CREATE VIRTUAL TABLE IF NOT EXISTS forge_fts USING fts5(
    id,
    term,
    definition,
    content='forge_concepts',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS forge_ai AFTER INSERT ON forge_concepts BEGIN
    INSERT INTO forge_fts(rowid, id, term, definition)
    VALUES (NEW.rowid, NEW.id, NEW.term, NEW.definition);
END;

CREATE TRIGGER IF NOT EXISTS forge_ad AFTER DELETE ON forge_concepts BEGIN
    INSERT INTO forge_fts(forge_fts, rowid, id, term, definition)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.term, OLD.definition);
END;

CREATE TRIGGER IF NOT EXISTS forge_au AFTER UPDATE ON forge_concepts BEGIN
    INSERT INTO forge_fts(forge_fts, rowid, id, term, definition)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.term, OLD.definition);
    INSERT INTO forge_fts(rowid, id, term, definition)
    VALUES (NEW.rowid, NEW.id, NEW.term, NEW.definition);
END;

-- ============================================================================
-- KNOWLEDGE GRAPH (typed entities + typed weighted edges)
-- ============================================================================

CREATE TABLE IF NOT EXISTS graph_entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    aliases TEXT NOT NULL DEFAULT '[]',
    memory_ids TEXT NOT NULL DEFAULT '[]',
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(name, entity_type)
);

CREATE TABLE IF NOT EXISTS graph_relationships (
    id TEXT PRIMARY KEY,
    source_entity_id TEXT NOT NULL,
    target_entity_id TEXT NOT NULL,
    rel_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    evidence_ids TEXT NOT NULL DEFAULT '[]',
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_entity_id, target_entity_id, rel_type),
    FOREIGN KEY (source_entity_id) REFERENCES graph_entities(id) ON DELETE CASCADE,
    FOREIGN KEY (target_entity_id) REFERENCES graph_entities(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_rel_source ON graph_relationships(source_entity_id);
CREATE INDEX IF NOT EXISTS idx_rel_target ON graph_relationships(target_entity_id);

-- ============================================================================
-- JOB SEARCH (boards, postings, applications)
-- ============================================================================

CREATE TABLE IF NOT EXISTS job_boards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    board_type TEXT NOT NULL DEFAULT 'listing',
    tags TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1,
    last_checked TEXT,
    content_hash TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_postings (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL,
    company TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    required_skills TEXT NOT NULL DEFAULT '[]',
    preferred_skills TEXT NOT NULL DEFAULT '[]',
    salary_min INTEGER,
    salary_max INTEGER,
    work_mode TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    discovered_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS job_postings_fts USING fts5(
    id,
    title,
    company,
    description,
    content='job_postings',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS job_postings_ai AFTER INSERT ON job_postings BEGIN
    INSERT INTO job_postings_fts(rowid, id, title, company, description)
    VALUES (NEW.rowid, NEW.id, NEW.title, NEW.company, NEW.description);
END;

CREATE TRIGGER IF NOT EXISTS job_postings_ad AFTER DELETE ON job_postings BEGIN
    INSERT INTO job_postings_fts(job_postings_fts, rowid, id, title, company, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.title, OLD.company, OLD.description);
END;

CREATE TRIGGER IF NOT EXISTS job_postings_au AFTER UPDATE ON job_postings BEGIN
    INSERT INTO job_postings_fts(job_postings_fts, rowid, id, title, company, description)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.title, OLD.company, OLD.description);
    INSERT INTO job_postings_fts(rowid, id, title, company, description)
    VALUES (NEW.rowid, NEW.id, NEW.title, NEW.company, NEW.description);
END;

CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'discovered',
    resume_path TEXT NOT NULL DEFAULT '',
    cover_letter_path TEXT NOT NULL DEFAULT '',
    applied_date TEXT,
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);

CREATE TABLE IF NOT EXISTS interview_prep (
    id TEXT PRIMARY KEY,
    application_id TEXT NOT NULL UNIQUE,
    company_research TEXT NOT NULL DEFAULT '',
    questions TEXT NOT NULL DEFAULT '[]',
    answers TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- LIFE DOMAINS & GOALS
-- ============================================================================

CREATE TABLE IF NOT EXISTS life_domains (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 0,
    hours_per_week REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS life_goals (
    id TEXT PRIMARY KEY,
    domain_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    progress REAL NOT NULL DEFAULT 0.0,
    target_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (domain_id) REFERENCES life_domains(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS life_sub_goals (
    id TEXT PRIMARY KEY,
    goal_id TEXT NOT NULL,
    title TEXT NOT NULL,
    done INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (goal_id) REFERENCES life_goals(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS life_goal_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    goal_id TEXT NOT NULL,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    unit TEXT NOT NULL DEFAULT '',
    recorded_at TEXT NOT NULL,
    FOREIGN KEY (goal_id) REFERENCES life_goals(id) ON DELETE CASCADE
);

-- ============================================================================
-- PULSE (written by hook scripts, read by the pulse tools)
-- ============================================================================

CREATE TABLE IF NOT EXISTS claude_sessions (
    session_id TEXT PRIMARY KEY,
    cwd TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    last_heartbeat TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    description TEXT NOT NULL DEFAULT '',
    tool_count INTEGER NOT NULL DEFAULT 0,
    last_tool TEXT NOT NULL DEFAULT '',
    last_tool_input TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS session_activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    tool_name TEXT NOT NULL DEFAULT '',
    tool_input_summary TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sal_session ON session_activity_log(session_id);
CREATE INDEX IF NOT EXISTS idx_sal_timestamp ON session_activity_log(timestamp);

-- ============================================================================
-- DAEMON (singleton state, lifecycle log, heartbeat checks)
-- ============================================================================

CREATE TABLE IF NOT EXISTS daemon_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    pid INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    last_heartbeat TEXT,
    modules TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'stopped'
);

CREATE TABLE IF NOT EXISTS daemon_lifecycle_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    detail TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS heartbeat_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    check_name TEXT NOT NULL,
    triggered INTEGER NOT NULL DEFAULT 0,
    message TEXT NOT NULL DEFAULT '',
    notified INTEGER NOT NULL DEFAULT 0,
    checked_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_heartbeat_check ON heartbeat_log(check_name, checked_at);

-- ============================================================================
-- SINGLE-ROW CONFIG TABLES
-- ============================================================================

CREATE TABLE IF NOT EXISTS personality_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    tone TEXT NOT NULL DEFAULT 'direct',
    verbosity TEXT NOT NULL DEFAULT 'normal',
    humor REAL NOT NULL DEFAULT 0.3,
    proactivity REAL NOT NULL DEFAULT 0.5,
    custom_instructions TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS onboarding_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    stage TEXT NOT NULL DEFAULT 'new',
    completed_steps TEXT NOT NULL DEFAULT '[]',
    started_at TEXT,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS telegram_bot_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    chat_id TEXT NOT NULL DEFAULT '',
    last_update_id INTEGER NOT NULL DEFAULT 0,
    paused INTEGER NOT NULL DEFAULT 0
);

-- Migration tracking
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// V2: Forge v2 — exam subjects, weighted objectives, two-axis review scoring
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS forge_subjects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    exam_date TEXT,
    pass_score REAL NOT NULL DEFAULT 0.8,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forge_objectives (
    id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    code TEXT NOT NULL,
    title TEXT NOT NULL,
    domain TEXT NOT NULL DEFAULT '',
    exam_weight REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    UNIQUE(subject_id, code),
    FOREIGN KEY (subject_id) REFERENCES forge_subjects(id) ON DELETE CASCADE
);

-- Many-to-many: a concept can serve several objectives
CREATE TABLE IF NOT EXISTS forge_concept_objectives (
    concept_id TEXT NOT NULL,
    objective_id TEXT NOT NULL,
    PRIMARY KEY (concept_id, objective_id),
    FOREIGN KEY (concept_id) REFERENCES forge_concepts(id) ON DELETE CASCADE,
    FOREIGN KEY (objective_id) REFERENCES forge_objectives(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS forge_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    concept_id TEXT NOT NULL,
    outcome TEXT NOT NULL,
    confidence INTEGER NOT NULL DEFAULT 3,
    was_correct INTEGER,
    notes TEXT NOT NULL DEFAULT '',
    subject_id TEXT NOT NULL DEFAULT '',
    reviewed_at TEXT NOT NULL,
    FOREIGN KEY (concept_id) REFERENCES forge_concepts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reviews_concept ON forge_reviews(concept_id);
CREATE INDEX IF NOT EXISTS idx_reviews_at ON forge_reviews(reviewed_at);

-- Error taxonomy populated when was_correct = 0
CREATE TABLE IF NOT EXISTS forge_error_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    concept_id TEXT NOT NULL,
    error_type TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    mastery_at_error REAL NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    FOREIGN KEY (concept_id) REFERENCES forge_concepts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_errors_concept ON forge_error_patterns(concept_id);
"#;

/// V3: Auxiliary job tables
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS trash_manifest (
    id TEXT PRIMARY KEY,
    original_path TEXT NOT NULL,
    trash_path TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    size_bytes INTEGER NOT NULL DEFAULT 0,
    sha256 TEXT NOT NULL DEFAULT '',
    is_dir INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    auto INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trash_expires ON trash_manifest(expires_at);

CREATE TABLE IF NOT EXISTS news_feed_sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    last_polled TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS news_feed_articles (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    content_hash TEXT NOT NULL UNIQUE,
    published_at TEXT,
    fetched_at TEXT NOT NULL,
    FOREIGN KEY (source_id) REFERENCES news_feed_sources(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS signalforge_articles (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    score REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signalforge_clusters (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL DEFAULT '',
    article_ids TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signalforge_synthesis (
    id TEXT PRIMARY KEY,
    cluster_id TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cram_topics (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS discovered_events (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    starts_at TEXT,
    source TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_deletion_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    filename TEXT NOT NULL,
    event_type TEXT NOT NULL,
    pid INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS git_shadow_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_path TEXT NOT NULL,
    stash_hash TEXT NOT NULL,
    changed_files INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_archive_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    sessions_archived INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS conversation_archive_sessions (
    session_id TEXT PRIMARY KEY,
    archived_at TEXT NOT NULL,
    path TEXT NOT NULL DEFAULT ''
);
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations inside a single IMMEDIATE transaction.
///
/// Safe to call from several processes at once: the write lock serialises
/// openers, and the version check inside the transaction makes the losers
/// no-ops.
pub fn apply_migrations(conn: &mut rusqlite::Connection) -> rusqlite::Result<u32> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let current_version = get_current_version(&tx)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles multi-statement SQL including triggers
            tx.execute_batch(migration.up)?;
            tx.execute(
                "INSERT OR IGNORE INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                [migration.version],
            )?;

            applied += 1;
        }
    }

    tx.commit()?;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_and_are_idempotent() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&mut conn).unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(
            get_current_version(&conn).unwrap(),
            MIGRATIONS.last().unwrap().version
        );

        // Re-opening an already-current store is a no-op
        let applied_again = apply_migrations(&mut conn).unwrap();
        assert_eq!(applied_again, 0);
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        let mut last = 0;
        for m in MIGRATIONS {
            assert!(m.version > last, "migration versions must increase");
            last = m.version;
        }
    }

    #[test]
    fn test_core_tables_exist_after_migration() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        for table in [
            "memories",
            "memory_vec",
            "memory_archive",
            "tasks",
            "sessions",
            "knowledge",
            "forge_concepts",
            "forge_subjects",
            "forge_objectives",
            "forge_reviews",
            "graph_entities",
            "graph_relationships",
            "claude_sessions",
            "session_activity_log",
            "daemon_state",
            "heartbeat_log",
            "trash_manifest",
            "git_shadow_snapshots",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table','view') AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
