//! # JayBrain Core
//!
//! Personal-agent memory and automation substrate. One SQLite file holds
//! everything; the modules around it provide:
//!
//! - **Hybrid retrieval**: FTS5 keyword + HNSW vector fusion with a
//!   recency/importance/access decay model
//! - **Forge**: objective-weighted spaced repetition with two-axis scoring,
//!   readiness and calibration views
//! - **Knowledge graph**: typed entities and weighted edges with BFS
//!   neighborhood traversal
//! - **Pulse**: cross-session awareness built from assistant hook events
//! - **Scheduler daemon**: a supervised singleton running heartbeat checks,
//!   feed polls, vault sync, trash sweeps, git shadow snapshots, the
//!   deletion watcher, daily briefings, and conversation archival
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jaybrain_core::{Store, RememberInput, RecallInput};
//!
//! let store = Store::open("data/jaybrain.store")?;
//!
//! let memory = store.remember(RememberInput {
//!     content: "Prefers explicit error types over anyhow in libraries".into(),
//!     category: "preference".into(),
//!     ..Default::default()
//! })?;
//!
//! let hits = store.recall(RecallInput {
//!     query: "error handling preference".into(),
//!     ..Default::default()
//! })?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed
//! - `vector-search` (default): HNSW K-NN with USearch
//! - `bundled-sqlite` (default): bundle SQLite with FTS5
//! - `full`: embeddings + vector-search

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod storage;

pub mod memory;
pub mod knowledge;
pub mod sessions;
pub mod tasks;

pub mod forge;
pub mod graph;
pub mod jobs;
pub mod life;

pub mod hooks;
pub mod pulse;
pub mod transcript;

pub mod daemon;
pub mod heartbeat;
pub mod notify;

pub mod briefing;
pub mod conversation_archive;
pub mod feeds;
pub mod file_watcher;
pub mod git_shadow;
pub mod network_decay;
pub mod time_allocation;
pub mod trash;
pub mod vault;

pub mod onboarding;
pub mod personality;
pub mod profile;

pub mod search;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Storage layer
pub use storage::{
    embedding_from_bytes, embedding_to_bytes, now_iso, short_id, Result, Store, StoreError,
};

// Config + SSRF guard
pub use config::{validate_url, Config, ConfigError};

// Memory
pub use memory::{
    decay::decay_multiplier, ConsolidationReport, DeepRecallResult, Memory, MemoryCategory,
    RecallHit, RecallInput, RememberInput,
};

// Knowledge
pub use knowledge::{KnowledgeEntry, KnowledgeHit, KnowledgeUpdate};

// Tasks
pub use tasks::{QueueResult, Task, TaskCreate, TaskPriority, TaskStatus, TaskUpdate};

// Sessions
pub use sessions::Session;

// Forge
pub use forge::{
    queue::{Calibration, QueueItem, Readiness, StudyQueue},
    scoring::{ErrorKind, ReviewOutcome},
    BloomLevel, ConceptInput, Difficulty, ForgeConcept, ForgeObjective, ForgeStats, ForgeSubject,
    ReviewInput, ReviewRecorded,
};

// Graph
pub use graph::{
    EntityUpsert, GraphEntity, GraphRelationship, Neighborhood, RelationshipUpsert,
    GRAPH_DEFAULT_DEPTH, GRAPH_MAX_DEPTH,
};

// Jobs
pub use jobs::{Application, InterviewPrep, JobBoard, JobPosting, PostingInput};

// Pulse
pub use pulse::{PulseOverview, PulseSession, SessionContext, SessionQuery};

// Daemon
pub use daemon::{get_daemon_status, Daemon, DaemonError, DaemonStatus, Trigger};

// Notifications
pub use notify::{LogNotifier, Notifier, NotifyError, MESSAGE_BUDGET};

// Embeddings
pub use embeddings::{cosine_similarity, embed_text, l2_normalize, EMBEDDING_DIMENSIONS};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model identifier (all-MiniLM-L6-v2, 384 dims)
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Config, ConceptInput, ForgeConcept, GraphEntity, Memory, Notifier, RecallInput,
        RememberInput, Result, ReviewInput, Store, StoreError, Task, TaskCreate,
    };
}
