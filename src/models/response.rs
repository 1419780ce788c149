//! Tool Payloads
//!
//! Request and response shapes for the nine coordinator operations.
//! These are the wire types carried over the stdio transport.

use serde::{Deserialize, Serialize};

use super::task::{
    FileOwnership, OwnershipType, ProgressLog, Task, TaskPriority, TaskStatus,
};

// ── Requests ────────────────────────────────────────────────────────────

/// Input to `create_tasks`: group metadata plus the structured task list
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTasksRequest {
    /// Group title
    pub title: String,
    /// Group description
    #[serde(default)]
    pub description: String,
    /// Tasks in sequence order (positions become 1-based sequences)
    pub tasks: Vec<TaskSpec>,
}

/// One task in a `create_tasks` request
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// 1-based sequence numbers of prerequisite tasks in the same request
    #[serde(default)]
    pub depends_on: Vec<i64>,
    /// File regions this task intends to touch
    #[serde(default)]
    pub file_patterns: Vec<FilePatternSpec>,
}

/// A declared file pattern with its ownership strength
#[derive(Debug, Clone, Deserialize)]
pub struct FilePatternSpec {
    pub pattern: String,
    #[serde(default)]
    pub ownership: OwnershipType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksRequest {
    #[serde(default)]
    pub group_id: Option<String>,
    /// Restrict to these statuses when present
    #[serde(default)]
    pub status: Option<Vec<TaskStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetTaskRequest {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimTaskRequest {
    pub task_id: String,
    /// Worker identity; generated when absent
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartTaskRequest {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProgressRequest {
    pub task_id: String,
    /// Percent complete, 0-100
    pub progress: u8,
    /// Free-form status note
    pub note: String,
    /// Paths touched since the last update, scanned for ownership conflicts
    #[serde(default)]
    pub files_changed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteTaskRequest {
    pub task_id: String,
    /// Summary of the delivered work, stored as the final progress note
    pub summary: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// How a task branch is integrated into trunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Collapse the branch into a single commit on trunk
    #[default]
    Squash,
    /// Regular merge commit
    Merge,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeTaskRequest {
    pub task_id: String,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupTaskRequest {
    pub task_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

// ── Responses ───────────────────────────────────────────────────────────

/// Compact projection of a task for listings and unlock reports
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub sequence: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub can_start: bool,
}

/// Result of `create_tasks`
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTasks {
    pub group_id: String,
    pub tasks: Vec<TaskSummary>,
    /// Non-fatal problems: dropped edges, cycles, pattern overlaps
    pub warnings: Vec<String>,
}

/// One row of a `list_tasks` response
#[derive(Debug, Clone, Serialize)]
pub struct TaskOverview {
    pub id: String,
    pub group_id: String,
    pub sequence: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub progress: u8,
    /// Reported for pending tasks only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_start: Option<bool>,
}

/// Status counts over the matching tasks
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub in_review: usize,
    pub completed: usize,
    pub blocked: usize,
}

/// Result of `list_tasks`
#[derive(Debug, Clone, Serialize)]
pub struct TaskListing {
    pub tasks: Vec<TaskOverview>,
    pub summary: StatusSummary,
}

/// Dependency projection inside `get_task`
#[derive(Debug, Clone, Serialize)]
pub struct DependencyInfo {
    pub sequence: i64,
    pub title: String,
    pub status: TaskStatus,
}

/// Result of `get_task`
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub dependencies: Vec<DependencyInfo>,
    pub file_ownership: Vec<FileOwnership>,
    pub progress_log: Vec<ProgressLog>,
}

/// Result of `claim_task`; soft precondition failures land here
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl ClaimOutcome {
    pub fn granted(task: Task, agent_id: String) -> Self {
        Self {
            success: true,
            error: None,
            task: Some(task),
            agent_id: Some(agent_id),
        }
    }

    pub fn refused(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            task: None,
            agent_id: None,
        }
    }
}

/// Completed prerequisite reference handed to a starting worker
#[derive(Debug, Clone, Serialize)]
pub struct DependencyRef {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

/// Result of `start_task`: the worker's execution context
#[derive(Debug, Clone, Serialize)]
pub struct StartContext {
    pub task: Task,
    pub branch_name: String,
    pub worktree_path: String,
    pub description: String,
    pub file_patterns: Vec<FileOwnership>,
    /// Completed prerequisites, for code-reference hints
    pub completed_dependencies: Vec<DependencyRef>,
}

/// Result of `update_progress`
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub task: Task,
    /// Files touching other tasks' exclusive patterns
    pub conflict_warnings: Vec<String>,
    /// Trunk has advanced past the task branch (best effort)
    pub rebase_recommended: bool,
}

/// Result of `complete_task`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub task: Task,
    /// Previously blocked tasks that became pending
    pub unlocked: Vec<TaskSummary>,
}

/// Overall merge verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeVerdict {
    Clean,
    Conflict,
}

/// One conflicted path in a failed merge
#[derive(Debug, Clone, Serialize)]
pub struct ConflictDetail {
    pub file: String,
    pub description: String,
    pub suggestion: String,
    pub auto_resolvable: bool,
}

/// Best-effort cleanup report for worktree and branch removal
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupStatus {
    pub worktree_removed: bool,
    pub branch_deleted: bool,
    /// Tolerated cleanup failures
    pub warnings: Vec<String>,
}

/// Result of `merge_task`
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub merge_result: MergeVerdict,
    pub task: Task,
    /// Populated on conflict
    pub conflicts: Vec<ConflictDetail>,
    /// Populated on clean merge
    pub unlocked: Vec<TaskSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupStatus>,
}

/// Result of `cleanup_task`
#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub task: Task,
    pub cleaned: CleanupStatus,
}
