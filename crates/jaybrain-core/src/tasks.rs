//! Tasks & the Work Queue
//!
//! Plain task CRUD plus a strictly-ordered active queue. Queue positions are
//! unique among queued tasks and re-indexed to stay contiguous; a completed
//! or cancelled task leaves the queue automatically.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::storage::{now_iso, short_id, Result, Store, StoreError};

// ============================================================================
// TYPES
// ============================================================================

/// Task status
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "done" => Some(TaskStatus::Done),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that may hold a queue position.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::InProgress | TaskStatus::Blocked)
    }
}

/// Task priority
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "critical" => Some(TaskPriority::Critical),
            _ => None,
        }
    }
}

/// A task row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub project: String,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
    pub queue_position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Store::task_create`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskCreate {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
}

/// Typed update record; optional fields are applied when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<String>,
}

/// Queue mutation outcomes with the conflict cases spelled out
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum QueueResult {
    Queued { task: Task },
    AlreadyQueued { task: Task },
    NotFound { id: String },
    Popped { task: Task, next_task: Option<Task> },
    Empty,
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let tags: String = row.get("tags")?;
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        project: row.get("project")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        due_date: row.get("due_date")?,
        queue_position: row.get("queue_position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const TASK_COLUMNS: &str = "id, title, description, status, priority, project, tags, due_date, queue_position, created_at, updated_at";

// ============================================================================
// STORE API
// ============================================================================

impl Store {
    /// Create a task.
    pub fn task_create(&self, input: TaskCreate) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(StoreError::Validation("task title is required".into()));
        }
        let priority = match &input.priority {
            Some(p) => TaskPriority::parse_name(p)
                .ok_or_else(|| StoreError::Validation(format!("unknown priority '{p}'")))?,
            None => TaskPriority::default(),
        };

        let id = short_id();
        let now = now_iso();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO tasks (id, title, description, status, priority, project, tags, due_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'todo', ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    input.title,
                    input.description,
                    priority.as_str(),
                    input.project.unwrap_or_default(),
                    serde_json::to_string(&input.tags).unwrap_or_else(|_| "[]".into()),
                    input.due_date,
                    now,
                ],
            )?;
        }
        self.get_task(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch a task by id.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let conn = self.read()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                [id],
                |row| row_to_task(row),
            )
            .optional()?;
        Ok(task)
    }

    /// List tasks, optionally filtered by status and/or project.
    pub fn task_list(
        &self,
        status: Option<&str>,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        if let Some(s) = status {
            if TaskStatus::parse_name(s).is_none() {
                return Err(StoreError::Validation(format!("unknown status '{s}'")));
            }
        }
        let conn = self.read()?;
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(s) = status {
            args.push(s.to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(p) = project {
            args.push(p.to_string());
            sql.push_str(&format!(" AND project = ?{}", args.len()));
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| row_to_task(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Update a task. A transition to `done` or `cancelled` removes it from
    /// the queue and closes the gap.
    pub fn task_update(&self, id: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let Some(_existing) = self.get_task(id)? else {
            return Ok(None);
        };

        let new_status = match &update.status {
            Some(s) => Some(
                TaskStatus::parse_name(s)
                    .ok_or_else(|| StoreError::Validation(format!("unknown status '{s}'")))?,
            ),
            None => None,
        };
        if let Some(p) = &update.priority {
            if TaskPriority::parse_name(p).is_none() {
                return Err(StoreError::Validation(format!("unknown priority '{p}'")));
            }
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(StoreError::Validation("task title is required".into()));
            }
        }

        let mut fields: Vec<(&str, serde_json::Value)> = Vec::new();
        if let Some(v) = &update.title {
            fields.push(("title", serde_json::json!(v)));
        }
        if let Some(v) = &update.description {
            fields.push(("description", serde_json::json!(v)));
        }
        if let Some(v) = &update.status {
            fields.push(("status", serde_json::json!(v)));
        }
        if let Some(v) = &update.priority {
            fields.push(("priority", serde_json::json!(v)));
        }
        if let Some(v) = &update.project {
            fields.push(("project", serde_json::json!(v)));
        }
        if let Some(v) = &update.tags {
            fields.push(("tags", serde_json::json!(v)));
        }
        if let Some(v) = &update.due_date {
            fields.push(("due_date", serde_json::json!(v)));
        }
        if fields.is_empty() {
            return Err(StoreError::Validation("no fields to update".into()));
        }
        fields.push(("updated_at", serde_json::json!(now_iso())));

        self.update_row("tasks", id, &fields)?;

        if let Some(status) = new_status {
            if !status.is_active() {
                self.queue_remove(id)?;
            }
        }

        self.get_task(id)
    }

    /// Push a task onto the queue. `position` is 1-based; omitted means the
    /// tail. Pushing into the middle shifts everything at or after the slot.
    pub fn queue_push(&self, id: &str, position: Option<i64>) -> Result<QueueResult> {
        let Some(task) = self.get_task(id)? else {
            return Ok(QueueResult::NotFound { id: id.to_string() });
        };
        if task.queue_position.is_some() {
            return Ok(QueueResult::AlreadyQueued { task });
        }
        let status = TaskStatus::parse_name(&task.status).unwrap_or_default();
        if !status.is_active() {
            return Err(StoreError::Validation(format!(
                "task '{id}' is {} and cannot be queued",
                task.status
            )));
        }

        {
            let mut conn = self.write()?;
            let tx = conn.transaction()?;
            let len: i64 = tx.query_row(
                "SELECT COUNT(*) FROM tasks WHERE queue_position IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            let slot = position.unwrap_or(len + 1).clamp(1, len + 1);
            tx.execute(
                "UPDATE tasks SET queue_position = queue_position + 1
                 WHERE queue_position >= ?1",
                [slot],
            )?;
            tx.execute(
                "UPDATE tasks SET queue_position = ?1, updated_at = ?2 WHERE id = ?3",
                params![slot, now_iso(), id],
            )?;
            tx.commit()?;
        }

        let task = self
            .get_task(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(QueueResult::Queued { task })
    }

    /// Pop the head of the queue, shifting the rest up.
    pub fn queue_pop(&self) -> Result<QueueResult> {
        let head = {
            let conn = self.read()?;
            conn.query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE queue_position IS NOT NULL
                     ORDER BY queue_position LIMIT 1"
                ),
                [],
                |row| row_to_task(row),
            )
            .optional()?
        };
        let Some(head) = head else {
            return Ok(QueueResult::Empty);
        };

        {
            let mut conn = self.write()?;
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE tasks SET queue_position = NULL, updated_at = ?1 WHERE id = ?2",
                params![now_iso(), head.id],
            )?;
            tx.execute(
                "UPDATE tasks SET queue_position = queue_position - 1
                 WHERE queue_position IS NOT NULL",
                [],
            )?;
            tx.commit()?;
        }

        let task = self
            .get_task(&head.id)?
            .ok_or_else(|| StoreError::NotFound(head.id.clone()))?;
        let next_task = {
            let conn = self.read()?;
            conn.query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE queue_position = 1"
                ),
                [],
                |row| row_to_task(row),
            )
            .optional()?
        };
        Ok(QueueResult::Popped { task, next_task })
    }

    /// The queue in order.
    pub fn queue_view(&self) -> Result<Vec<Task>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE queue_position IS NOT NULL
             ORDER BY queue_position"
        ))?;
        let rows = stmt
            .query_map([], |row| row_to_task(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Remove a task from the queue (if present) and reindex to stay
    /// contiguous. Runs in one transaction so observers see either ordering.
    fn queue_remove(&self, id: &str) -> Result<()> {
        let mut conn = self.write()?;
        let tx = conn.transaction()?;
        let position: Option<i64> = tx
            .query_row("SELECT queue_position FROM tasks WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        if let Some(position) = position {
            tx.execute(
                "UPDATE tasks SET queue_position = NULL WHERE id = ?1",
                [id],
            )?;
            tx.execute(
                "UPDATE tasks SET queue_position = queue_position - 1
                 WHERE queue_position > ?1",
                [position],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
