//! Data Models
//!
//! Entities persisted by the store and the wire payloads of the tool surface.

pub mod response;
pub mod task;

pub use response::{
    ClaimOutcome, ClaimTaskRequest, CleanupOutcome, CleanupStatus, CleanupTaskRequest,
    CompleteTaskRequest, CompletionResult, ConflictDetail, CreateTasksRequest, CreatedTasks,
    DependencyInfo, DependencyRef, FilePatternSpec, GetTaskRequest, ListTasksRequest,
    MergeOutcome, MergeStrategy, MergeTaskRequest, MergeVerdict, ProgressReport, StartContext,
    StartTaskRequest, StatusSummary, TaskDetail, TaskListing, TaskOverview, TaskSpec,
    TaskSummary, UpdateProgressRequest,
};
pub use task::{
    FileOwnership, GroupStatus, OwnershipConflict, OwnershipType, ProgressEvent, ProgressLog,
    Task, TaskDependency, TaskGroup, TaskPriority, TaskStatus,
};
