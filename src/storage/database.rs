//! SQLite Task Store
//!
//! Durable persistence for groups, tasks, dependencies, file-ownership
//! claims, and progress logs, using rusqlite with r2d2 connection pooling.
//! Multi-step operations in the coordinator run inside a single immediate
//! write transaction so that concurrent claims on the same task linearize.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior};

use crate::models::task::{
    FileOwnership, GroupStatus, OwnershipConflict, OwnershipType, ProgressEvent, ProgressLog,
    Task, TaskGroup, TaskPriority, TaskStatus,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Current UTC timestamp in the store's ISO-8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fields for a new task row; the store validates uniqueness constraints
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: String,
    pub group_id: String,
    pub sequence: i64,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
}

/// Sparse update of a task row; only provided fields change
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<String>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,
    pub progress: Option<u8>,
    pub progress_note: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub merged_at: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_to.is_none()
            && self.branch_name.is_none()
            && self.worktree_path.is_none()
            && self.progress.is_none()
            && self.progress_note.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
            && self.merged_at.is_none()
    }
}

/// Fields for a new progress-log entry; id and timestamp are assigned here
#[derive(Debug, Clone)]
pub struct NewProgress {
    pub task_id: String,
    pub event: ProgressEvent,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

const TASK_COLUMNS: &str = "id, group_id, sequence, title, description, status, priority, \
     assigned_to, branch_name, worktree_path, progress, progress_note, \
     created_at, started_at, completed_at, merged_at";

fn task_columns(alias: &str) -> String {
    TASK_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Process-wide registry of open stores, keyed by resolved absolute path
static STORES: OnceLock<Mutex<HashMap<PathBuf, TaskStore>>> = OnceLock::new();

/// Task store over a pooled SQLite database
#[derive(Clone)]
pub struct TaskStore {
    pool: DbPool,
}

impl TaskStore {
    /// Open (or create) a file-backed store at the given path
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        paths::ensure_parent_dir(path)?;

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL; \
                 PRAGMA foreign_keys=ON; \
                 PRAGMA busy_timeout=5000;",
            )
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the process-wide store for a path, opening it on first use.
    ///
    /// Handles are keyed by the resolved absolute path, so every caller in
    /// the process shares one pool per store file.
    pub fn shared(path: impl AsRef<Path>) -> AppResult<Self> {
        let abs = paths::absolute(path.as_ref())?;
        let registry = STORES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registry
            .lock()
            .map_err(|_| AppError::internal("store registry lock poisoned"))?;
        if let Some(store) = map.get(&abs) {
            return Ok(store.clone());
        }
        let store = Self::open(&abs)?;
        map.insert(abs, store.clone());
        Ok(store)
    }

    /// Create a fresh in-memory store.
    ///
    /// The pool holds a single connection so the database is shared across
    /// all uses of the handle. Intended for tests.
    pub fn in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Initialize the database schema (idempotent)
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_groups (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'completed', 'archived')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL REFERENCES task_groups(id),
                sequence INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'blocked', 'assigned', 'in_progress',
                                      'in_review', 'completed', 'failed')),
                priority TEXT NOT NULL DEFAULT 'medium'
                    CHECK (priority IN ('high', 'medium', 'low')),
                assigned_to TEXT,
                branch_name TEXT,
                worktree_path TEXT,
                progress INTEGER NOT NULL DEFAULT 0,
                progress_note TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                started_at TEXT,
                completed_at TEXT,
                merged_at TEXT,
                UNIQUE (group_id, sequence)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL REFERENCES tasks(id),
                depends_on TEXT NOT NULL REFERENCES tasks(id),
                PRIMARY KEY (task_id, depends_on)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_file_ownership (
                task_id TEXT NOT NULL REFERENCES tasks(id),
                file_pattern TEXT NOT NULL,
                ownership_type TEXT NOT NULL DEFAULT 'exclusive'
                    CHECK (ownership_type IN ('exclusive', 'shared')),
                PRIMARY KEY (task_id, file_pattern)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS progress_logs (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                event TEXT NOT NULL
                    CHECK (event IN ('claimed', 'started', 'progress_update', 'rebased',
                                     'completed', 'failed', 'merged', 'conflict_detected')),
                message TEXT NOT NULL DEFAULT '',
                metadata TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_group_id ON tasks(group_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_task_dependencies_task_id
                 ON task_dependencies(task_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_task_dependencies_depends_on
                 ON task_dependencies(depends_on)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_progress_logs_task_id
                 ON progress_logs(task_id)",
            [],
        )?;

        Ok(())
    }

    /// Run a closure inside an immediate write transaction.
    ///
    /// The write lock is taken up front, so two concurrent state-changing
    /// operations on the same task serialize and the loser observes the
    /// committed state. The transaction rolls back when the closure errors.
    pub fn write_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Groups ──────────────────────────────────────────────────────────

    pub fn create_group_in(
        conn: &Connection,
        id: &str,
        title: &str,
        description: &str,
    ) -> AppResult<TaskGroup> {
        let created_at = now_iso();
        conn.execute(
            "INSERT INTO task_groups (id, title, description, status, created_at)
             VALUES (?1, ?2, ?3, 'active', ?4)",
            params![id, title, description, created_at],
        )?;
        Ok(TaskGroup {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: GroupStatus::Active,
            created_at,
        })
    }

    pub fn create_group(&self, id: &str, title: &str, description: &str) -> AppResult<TaskGroup> {
        let conn = self.conn()?;
        Self::create_group_in(&conn, id, title, description)
    }

    pub fn get_group_in(conn: &Connection, id: &str) -> AppResult<Option<TaskGroup>> {
        let group = conn
            .query_row(
                "SELECT id, title, description, status, created_at
                 FROM task_groups WHERE id = ?1",
                params![id],
                row_to_group,
            )
            .optional()?;
        Ok(group)
    }

    pub fn get_group(&self, id: &str) -> AppResult<Option<TaskGroup>> {
        let conn = self.conn()?;
        Self::get_group_in(&conn, id)
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    pub fn create_task_in(conn: &Connection, task: &NewTask) -> AppResult<Task> {
        let created_at = now_iso();
        conn.execute(
            "INSERT INTO tasks (id, group_id, sequence, title, description, status,
                                priority, progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                task.id,
                task.group_id,
                task.sequence,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                created_at,
            ],
        )?;
        Self::get_task_in(conn, &task.id)?
            .ok_or_else(|| AppError::database("Failed to retrieve newly created task"))
    }

    pub fn create_task(&self, task: &NewTask) -> AppResult<Task> {
        let conn = self.conn()?;
        Self::create_task_in(&conn, task)
    }

    pub fn get_task_in(conn: &Connection, id: &str) -> AppResult<Option<Task>> {
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        let conn = self.conn()?;
        Self::get_task_in(&conn, id)
    }

    pub fn get_task_by_group_sequence_in(
        conn: &Connection,
        group_id: &str,
        sequence: i64,
    ) -> AppResult<Option<Task>> {
        let task = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tasks WHERE group_id = ?1 AND sequence = ?2",
                    TASK_COLUMNS
                ),
                params![group_id, sequence],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub fn get_task_by_group_sequence(
        &self,
        group_id: &str,
        sequence: i64,
    ) -> AppResult<Option<Task>> {
        let conn = self.conn()?;
        Self::get_task_by_group_sequence_in(&conn, group_id, sequence)
    }

    /// List tasks, optionally filtered by group and status set, ordered by
    /// group then sequence
    pub fn list_tasks_in(
        conn: &Connection,
        group_id: Option<&str>,
        statuses: Option<&[TaskStatus]>,
    ) -> AppResult<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks", TASK_COLUMNS);
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(group) = group_id {
            values.push(Box::new(group.to_string()));
            clauses.push(format!("group_id = ?{}", values.len()));
        }
        if let Some(statuses) = statuses {
            if !statuses.is_empty() {
                let mut placeholders = Vec::new();
                for status in statuses {
                    values.push(Box::new(status.as_str().to_string()));
                    placeholders.push(format!("?{}", values.len()));
                }
                clauses.push(format!("status IN ({})", placeholders.join(", ")));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY group_id ASC, sequence ASC");

        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn list_tasks(
        &self,
        group_id: Option<&str>,
        statuses: Option<&[TaskStatus]>,
    ) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        Self::list_tasks_in(&conn, group_id, statuses)
    }

    /// Apply a sparse update and return the resulting row.
    ///
    /// An empty patch is a no-op returning the current state.
    pub fn update_task_in(conn: &Connection, id: &str, patch: &TaskPatch) -> AppResult<Task> {
        let mut task = Self::get_task_in(conn, id)?
            .ok_or_else(|| AppError::not_found(format!("Task not found: {}", id)))?;
        if patch.is_empty() {
            return Ok(task);
        }

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(ref assigned_to) = patch.assigned_to {
            task.assigned_to = Some(assigned_to.clone());
        }
        if let Some(ref branch_name) = patch.branch_name {
            task.branch_name = Some(branch_name.clone());
        }
        if let Some(ref worktree_path) = patch.worktree_path {
            task.worktree_path = Some(worktree_path.clone());
        }
        if let Some(progress) = patch.progress {
            task.progress = progress;
        }
        if let Some(ref note) = patch.progress_note {
            task.progress_note = Some(note.clone());
        }
        if let Some(ref started_at) = patch.started_at {
            task.started_at = Some(started_at.clone());
        }
        if let Some(ref completed_at) = patch.completed_at {
            task.completed_at = Some(completed_at.clone());
        }
        if let Some(ref merged_at) = patch.merged_at {
            task.merged_at = Some(merged_at.clone());
        }

        conn.execute(
            "UPDATE tasks SET status = ?2, assigned_to = ?3, branch_name = ?4,
                 worktree_path = ?5, progress = ?6, progress_note = ?7,
                 started_at = ?8, completed_at = ?9, merged_at = ?10
             WHERE id = ?1",
            params![
                task.id,
                task.status.as_str(),
                task.assigned_to,
                task.branch_name,
                task.worktree_path,
                task.progress,
                task.progress_note,
                task.started_at,
                task.completed_at,
                task.merged_at,
            ],
        )?;
        Ok(task)
    }

    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> AppResult<Task> {
        let conn = self.conn()?;
        Self::update_task_in(&conn, id, patch)
    }

    // ── Dependencies ────────────────────────────────────────────────────

    /// Insert a dependency edge; duplicate edges collapse
    pub fn add_dependency_in(conn: &Connection, task_id: &str, depends_on: &str) -> AppResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on) VALUES (?1, ?2)",
            params![task_id, depends_on],
        )?;
        Ok(())
    }

    pub fn add_dependency(&self, task_id: &str, depends_on: &str) -> AppResult<()> {
        let conn = self.conn()?;
        Self::add_dependency_in(&conn, task_id, depends_on)
    }

    /// Prerequisite tasks of a task, ordered by sequence
    pub fn get_dependencies_in(conn: &Connection, task_id: &str) -> AppResult<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks t
             JOIN task_dependencies d ON d.depends_on = t.id
             WHERE d.task_id = ?1
             ORDER BY t.sequence ASC",
            task_columns("t")
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![task_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_dependencies(&self, task_id: &str) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        Self::get_dependencies_in(&conn, task_id)
    }

    /// Tasks that list the given task as a prerequisite, ordered by sequence
    pub fn get_dependents_in(conn: &Connection, task_id: &str) -> AppResult<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks t
             JOIN task_dependencies d ON d.task_id = t.id
             WHERE d.depends_on = ?1
             ORDER BY t.sequence ASC",
            task_columns("t")
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![task_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_dependents(&self, task_id: &str) -> AppResult<Vec<Task>> {
        let conn = self.conn()?;
        Self::get_dependents_in(&conn, task_id)
    }

    /// Full dependency edge map for a group: task id to prerequisite ids
    pub fn group_dependency_map_in(
        conn: &Connection,
        group_id: &str,
    ) -> AppResult<HashMap<String, Vec<String>>> {
        let mut stmt = conn.prepare(
            "SELECT d.task_id, d.depends_on FROM task_dependencies d
             JOIN tasks t ON t.id = d.task_id
             WHERE t.group_id = ?1",
        )?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (task_id, depends_on) = row?;
            map.entry(task_id).or_default().push(depends_on);
        }
        Ok(map)
    }

    pub fn group_dependency_map(&self, group_id: &str) -> AppResult<HashMap<String, Vec<String>>> {
        let conn = self.conn()?;
        Self::group_dependency_map_in(&conn, group_id)
    }

    // ── File ownership ──────────────────────────────────────────────────

    /// Record an ownership claim; replaces on (task, pattern) conflict
    pub fn add_file_ownership_in(conn: &Connection, ownership: &FileOwnership) -> AppResult<()> {
        conn.execute(
            "INSERT INTO task_file_ownership (task_id, file_pattern, ownership_type)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (task_id, file_pattern) DO UPDATE SET ownership_type = ?3",
            params![
                ownership.task_id,
                ownership.file_pattern,
                ownership.ownership.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn add_file_ownership(&self, ownership: &FileOwnership) -> AppResult<()> {
        let conn = self.conn()?;
        Self::add_file_ownership_in(&conn, ownership)
    }

    pub fn get_file_ownership_in(conn: &Connection, task_id: &str) -> AppResult<Vec<FileOwnership>> {
        let mut stmt = conn.prepare(
            "SELECT task_id, file_pattern, ownership_type FROM task_file_ownership
             WHERE task_id = ?1 ORDER BY file_pattern ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], row_to_ownership)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_file_ownership(&self, task_id: &str) -> AppResult<Vec<FileOwnership>> {
        let conn = self.conn()?;
        Self::get_file_ownership_in(&conn, task_id)
    }

    /// Patterns held identically by another task that is currently in
    /// progress. Non-identical overlap is the ownership engine's concern.
    pub fn find_ownership_conflicts_in(
        conn: &Connection,
        task_id: &str,
    ) -> AppResult<Vec<OwnershipConflict>> {
        let sql = format!(
            "SELECT {}, o2.file_pattern, o2.ownership_type
             FROM task_file_ownership o1
             JOIN task_file_ownership o2
               ON o2.file_pattern = o1.file_pattern AND o2.task_id != o1.task_id
             JOIN tasks t ON t.id = o2.task_id
             WHERE o1.task_id = ?1 AND t.status = 'in_progress'
             ORDER BY t.sequence ASC, o2.file_pattern ASC",
            task_columns("t")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![task_id], |row| {
                let task = row_to_task(row)?;
                let pattern: String = row.get(16)?;
                let ownership_str: String = row.get(17)?;
                let ownership = OwnershipType::parse(&ownership_str).ok_or_else(|| {
                    invalid_column(17, format!("unknown ownership type '{}'", ownership_str))
                })?;
                Ok(OwnershipConflict {
                    task,
                    pattern,
                    ownership,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_ownership_conflicts(&self, task_id: &str) -> AppResult<Vec<OwnershipConflict>> {
        let conn = self.conn()?;
        Self::find_ownership_conflicts_in(&conn, task_id)
    }

    // ── Progress logs ───────────────────────────────────────────────────

    /// Append a progress-log entry; id and timestamp are assigned here
    pub fn append_progress_in(conn: &Connection, entry: &NewProgress) -> AppResult<ProgressLog> {
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = now_iso();
        let metadata_json = match &entry.metadata {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO progress_logs (id, task_id, timestamp, event, message, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                entry.task_id,
                timestamp,
                entry.event.as_str(),
                entry.message,
                metadata_json
            ],
        )?;
        Ok(ProgressLog {
            id,
            task_id: entry.task_id.clone(),
            timestamp,
            event: entry.event,
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
        })
    }

    pub fn append_progress(&self, entry: &NewProgress) -> AppResult<ProgressLog> {
        let conn = self.conn()?;
        Self::append_progress_in(&conn, entry)
    }

    /// Progress log for a task, oldest first; insertion order breaks ties
    pub fn list_progress_in(conn: &Connection, task_id: &str) -> AppResult<Vec<ProgressLog>> {
        let mut stmt = conn.prepare(
            "SELECT id, task_id, timestamp, event, message, metadata FROM progress_logs
             WHERE task_id = ?1 ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], row_to_progress)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_progress(&self, task_id: &str) -> AppResult<Vec<ProgressLog>> {
        let conn = self.conn()?;
        Self::list_progress_in(&conn, task_id)
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("pool_size", &self.pool.state().connections)
            .finish()
    }
}

// ── Row mappers ─────────────────────────────────────────────────────────

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<TaskGroup> {
    let status_str: String = row.get(3)?;
    let status = GroupStatus::parse(&status_str)
        .ok_or_else(|| invalid_column(3, format!("unknown group status '{}'", status_str)))?;
    Ok(TaskGroup {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status,
        created_at: row.get(4)?,
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get(5)?;
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| invalid_column(5, format!("unknown task status '{}'", status_str)))?;
    let priority_str: String = row.get(6)?;
    let priority = TaskPriority::parse(&priority_str)
        .ok_or_else(|| invalid_column(6, format!("unknown priority '{}'", priority_str)))?;
    Ok(Task {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sequence: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status,
        priority,
        assigned_to: row.get(7)?,
        branch_name: row.get(8)?,
        worktree_path: row.get(9)?,
        progress: row.get(10)?,
        progress_note: row.get(11)?,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
        merged_at: row.get(15)?,
    })
}

fn row_to_ownership(row: &rusqlite::Row) -> rusqlite::Result<FileOwnership> {
    let ownership_str: String = row.get(2)?;
    let ownership = OwnershipType::parse(&ownership_str)
        .ok_or_else(|| invalid_column(2, format!("unknown ownership type '{}'", ownership_str)))?;
    Ok(FileOwnership {
        task_id: row.get(0)?,
        file_pattern: row.get(1)?,
        ownership,
    })
}

fn row_to_progress(row: &rusqlite::Row) -> rusqlite::Result<ProgressLog> {
    let event_str: String = row.get(3)?;
    let event = ProgressEvent::parse(&event_str)
        .ok_or_else(|| invalid_column(3, format!("unknown progress event '{}'", event_str)))?;
    let metadata_json: Option<String> = row.get(5)?;
    let metadata = match metadata_json {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| invalid_column(5, format!("bad metadata JSON: {}", e)))?,
        ),
        None => None,
    };
    Ok(ProgressLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        timestamp: row.get(2)?,
        event,
        message: row.get(4)?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_group() -> (TaskStore, String) {
        let store = TaskStore::in_memory().unwrap();
        let group = store.create_group("g1", "Blog", "Blog platform").unwrap();
        (store, group.id)
    }

    fn new_task(id: &str, group: &str, sequence: i64, title: &str) -> NewTask {
        NewTask {
            id: id.to_string(),
            group_id: group.to_string(),
            sequence,
            title: title.to_string(),
            description: String::new(),
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
        }
    }

    #[test]
    fn test_create_and_get_task() {
        let (store, group) = store_with_group();
        let created = store.create_task(&new_task("t1", &group, 1, "DB Schema")).unwrap();
        assert_eq!(created.sequence, 1);
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.progress, 0);

        let fetched = store.get_task("t1").unwrap().unwrap();
        assert_eq!(fetched.title, "DB Schema");
        assert!(store.get_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_sequence_collision_rejected() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        let err = store.create_task(&new_task("t2", &group, 1, "B"));
        assert!(err.is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        assert!(store.create_task(&new_task("t1", &group, 2, "B")).is_err());
    }

    #[test]
    fn test_get_task_by_group_sequence() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();

        let task = store.get_task_by_group_sequence(&group, 2).unwrap().unwrap();
        assert_eq!(task.id, "t2");
        assert!(store.get_task_by_group_sequence(&group, 9).unwrap().is_none());
    }

    #[test]
    fn test_update_task_sparse_and_noop() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();

        let unchanged = store.update_task("t1", &TaskPatch::default()).unwrap();
        assert_eq!(unchanged.status, TaskStatus::Pending);
        assert!(unchanged.assigned_to.is_none());

        let updated = store
            .update_task(
                "t1",
                &TaskPatch {
                    status: Some(TaskStatus::Assigned),
                    assigned_to: Some("agent-1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Assigned);
        assert_eq!(updated.assigned_to.as_deref(), Some("agent-1"));

        // Untouched fields survive a later sparse update
        let updated = store
            .update_task(
                "t1",
                &TaskPatch {
                    progress: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.assigned_to.as_deref(), Some("agent-1"));
        assert_eq!(updated.progress, 40);
    }

    #[test]
    fn test_add_dependency_idempotent() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();

        store.add_dependency("t2", "t1").unwrap();
        store.add_dependency("t2", "t1").unwrap();

        let deps = store.get_dependencies("t2").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, "t1");
    }

    #[test]
    fn test_dependencies_and_dependents_ordered() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();
        store.create_task(&new_task("t3", &group, 3, "C")).unwrap();

        store.add_dependency("t3", "t2").unwrap();
        store.add_dependency("t3", "t1").unwrap();

        let deps = store.get_dependencies("t3").unwrap();
        let ids: Vec<&str> = deps.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let dependents = store.get_dependents("t1").unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, "t3");
    }

    #[test]
    fn test_group_dependency_map() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();
        store.add_dependency("t2", "t1").unwrap();

        let map = store.group_dependency_map(&group).unwrap();
        assert_eq!(map.get("t2").unwrap(), &vec!["t1".to_string()]);
        assert!(!map.contains_key("t1"));
    }

    #[test]
    fn test_file_ownership_replace_on_conflict() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();

        store
            .add_file_ownership(&FileOwnership {
                task_id: "t1".to_string(),
                file_pattern: "src/db/**".to_string(),
                ownership: OwnershipType::Exclusive,
            })
            .unwrap();
        store
            .add_file_ownership(&FileOwnership {
                task_id: "t1".to_string(),
                file_pattern: "src/db/**".to_string(),
                ownership: OwnershipType::Shared,
            })
            .unwrap();

        let owned = store.get_file_ownership("t1").unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].ownership, OwnershipType::Shared);
    }

    #[test]
    fn test_find_ownership_conflicts_only_in_progress() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();

        for id in ["t1", "t2"] {
            store
                .add_file_ownership(&FileOwnership {
                    task_id: id.to_string(),
                    file_pattern: "src/db/**".to_string(),
                    ownership: OwnershipType::Exclusive,
                })
                .unwrap();
        }

        // Other holder is pending: no conflict yet
        assert!(store.find_ownership_conflicts("t2").unwrap().is_empty());

        store
            .update_task(
                "t1",
                &TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();

        let conflicts = store.find_ownership_conflicts("t2").unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].task.id, "t1");
        assert_eq!(conflicts[0].pattern, "src/db/**");
    }

    #[test]
    fn test_progress_metadata_round_trip() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();

        let metadata = json!({"branch_name": "task/task-1-a", "files": ["src/a.rs", "src/b.rs"]});
        store
            .append_progress(&NewProgress {
                task_id: "t1".to_string(),
                event: ProgressEvent::Started,
                message: "Worktree created".to_string(),
                metadata: Some(metadata.clone()),
            })
            .unwrap();

        let log = store.list_progress("t1").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event, ProgressEvent::Started);
        assert_eq!(log[0].metadata, Some(metadata));
    }

    #[test]
    fn test_progress_insertion_order_preserved() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();

        for i in 0..5 {
            store
                .append_progress(&NewProgress {
                    task_id: "t1".to_string(),
                    event: ProgressEvent::ProgressUpdate,
                    message: format!("update {}", i),
                    metadata: None,
                })
                .unwrap();
        }

        let log = store.list_progress("t1").unwrap();
        let messages: Vec<&str> = log.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["update 0", "update 1", "update 2", "update 3", "update 4"]
        );
    }

    #[test]
    fn test_list_tasks_filters() {
        let (store, group) = store_with_group();
        store.create_task(&new_task("t1", &group, 1, "A")).unwrap();
        store.create_task(&new_task("t2", &group, 2, "B")).unwrap();
        store
            .update_task(
                "t2",
                &TaskPatch {
                    status: Some(TaskStatus::Blocked),
                    ..Default::default()
                },
            )
            .unwrap();

        let all = store.list_tasks(Some(&group), None).unwrap();
        assert_eq!(all.len(), 2);

        let blocked = store
            .list_tasks(Some(&group), Some(&[TaskStatus::Blocked]))
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, "t2");

        let none = store.list_tasks(Some("other"), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = TaskStore::in_memory().unwrap();
        let orphan = NewTask {
            id: "t1".to_string(),
            group_id: "no-such-group".to_string(),
            sequence: 1,
            title: "A".to_string(),
            description: String::new(),
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
        };
        assert!(store.create_task(&orphan).is_err());
    }

    #[test]
    fn test_write_tx_rolls_back_on_error() {
        let (store, group) = store_with_group();
        let result: AppResult<()> = store.write_tx(|tx| {
            TaskStore::create_task_in(tx, &new_task("t1", &group, 1, "A"))?;
            Err(AppError::internal("boom"))
        });
        assert!(result.is_err());
        assert!(store.get_task("t1").unwrap().is_none());
    }

    #[test]
    fn test_shared_returns_same_store_for_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        let a = TaskStore::shared(&path).unwrap();
        a.create_group("g1", "Blog", "").unwrap();
        let b = TaskStore::shared(&path).unwrap();
        assert!(b.get_group("g1").unwrap().is_some());
    }

    #[test]
    fn test_open_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.db");
        {
            let store = TaskStore::open(&path).unwrap();
            store.create_group("g1", "Blog", "").unwrap();
        }
        let store = TaskStore::open(&path).unwrap();
        assert!(store.get_group("g1").unwrap().is_some());
    }
}
