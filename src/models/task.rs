//! Task Models
//!
//! Core entities of the coordinator: groups, tasks, dependencies, file
//! ownership claims, and the append-only progress log.

use serde::{Deserialize, Serialize};

/// Status of a task group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Group has unfinished tasks
    #[default]
    Active,
    /// Every task merged
    Completed,
    /// Retired from active listings
    Archived,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cohesive batch of tasks originating from one high-level requirement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    /// Unique identifier
    pub id: String,
    /// Short human-readable title
    pub title: String,
    /// What the group is about
    pub description: String,
    /// Current status (MVP keeps groups active)
    pub status: GroupStatus,
    /// Creation timestamp (ISO 8601 UTC)
    pub created_at: String,
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for claiming once dependencies allow
    #[default]
    Pending,
    /// Waiting on incomplete prerequisites
    Blocked,
    /// Claimed by a worker, not yet started
    Assigned,
    /// Worker is active in its worktree
    InProgress,
    /// Work finished, awaiting merge to trunk
    InReview,
    /// Merged to trunk
    Completed,
    /// Abandoned or cleaned up
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "blocked" => Some(Self::Blocked),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker-facing priority hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work assignable to one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Owning group
    pub group_id: String,
    /// 1-based position within the group, stable for its lifetime
    pub sequence: i64,
    /// Short human-readable title
    pub title: String,
    /// Worker-facing description of the work
    pub description: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Priority hint
    pub priority: TaskPriority,
    /// Worker identity once claimed
    pub assigned_to: Option<String>,
    /// Branch created by start_task (retained for audit after merge/cleanup)
    pub branch_name: Option<String>,
    /// Worktree path created by start_task (retained for audit)
    pub worktree_path: Option<String>,
    /// Percent complete, 0-100
    pub progress: u8,
    /// Latest free-form progress note
    pub progress_note: Option<String>,
    /// Creation timestamp (ISO 8601 UTC)
    pub created_at: String,
    /// Set when the task enters in_progress
    pub started_at: Option<String>,
    /// Set when the task enters in_review
    pub completed_at: Option<String>,
    /// Set when the task is merged to trunk
    pub merged_at: Option<String>,
}

/// A directed edge from a dependent task to a prerequisite in the same group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on: String,
}

/// How strongly a task claims the files matching a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipType {
    /// Only the owning task may modify matching files while in progress
    #[default]
    Exclusive,
    /// The task expects to touch matching files but tolerates others
    Shared,
}

impl OwnershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exclusive" => Some(Self::Exclusive),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

impl std::fmt::Display for OwnershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A worker's declared interest in a file region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOwnership {
    pub task_id: String,
    /// Directory-prefix glob pattern, e.g. `src/db/**`
    pub file_pattern: String,
    pub ownership: OwnershipType,
}

/// An identical-pattern collision found by the store
#[derive(Debug, Clone, Serialize)]
pub struct OwnershipConflict {
    /// The other task holding the pattern
    pub task: Task,
    pub pattern: String,
    pub ownership: OwnershipType,
}

/// Kind of progress-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Claimed,
    Started,
    ProgressUpdate,
    Rebased,
    Completed,
    Failed,
    Merged,
    ConflictDetected,
}

impl ProgressEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Started => "started",
            Self::ProgressUpdate => "progress_update",
            Self::Rebased => "rebased",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Merged => "merged",
            Self::ConflictDetected => "conflict_detected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claimed" => Some(Self::Claimed),
            "started" => Some(Self::Started),
            "progress_update" => Some(Self::ProgressUpdate),
            "rebased" => Some(Self::Rebased),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "merged" => Some(Self::Merged),
            "conflict_detected" => Some(Self::ConflictDetected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only audit record attached to a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressLog {
    pub id: String,
    pub task_id: String,
    /// Insertion timestamp (ISO 8601 UTC), assigned by the store
    pub timestamp: String,
    pub event: ProgressEvent,
    pub message: String,
    /// Structured context, round-trip preserved
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Blocked,
            TaskStatus::Assigned,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::InReview.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: TaskStatus = serde_json::from_str("\"in_review\"").unwrap();
        assert_eq!(back, TaskStatus::InReview);
    }

    #[test]
    fn test_event_round_trip() {
        for event in [
            ProgressEvent::Claimed,
            ProgressEvent::Started,
            ProgressEvent::ProgressUpdate,
            ProgressEvent::Rebased,
            ProgressEvent::Completed,
            ProgressEvent::Failed,
            ProgressEvent::Merged,
            ProgressEvent::ConflictDetected,
        ] {
            assert_eq!(ProgressEvent::parse(event.as_str()), Some(event));
        }
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_ownership_default_is_exclusive() {
        assert_eq!(OwnershipType::default(), OwnershipType::Exclusive);
    }
}
