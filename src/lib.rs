//! task-fleet - Multi-Agent Task Coordinator
//!
//! A long-lived local server that partitions a single-repository effort
//! into a dependency graph of tasks, hands tasks to concurrent autonomous
//! workers (each in an isolated git worktree), tracks their progress, and
//! integrates their results back into trunk. It includes:
//! - SQLite-backed durable task store
//! - Dependency DAG analysis with unblock propagation
//! - File-ownership conflict detection
//! - Git worktree and merge lifecycle management
//! - JSON-RPC 2.0 tool surface over stdio

pub mod models;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::{
    ClaimOutcome, CleanupOutcome, CompletionResult, CreatedTasks, FileOwnership, MergeOutcome,
    MergeStrategy, ProgressEvent, ProgressLog, ProgressReport, StartContext, Task, TaskDetail,
    TaskGroup, TaskListing, TaskStatus,
};
pub use server::{coordinator_registry, StdioServer, ToolRegistry};
pub use services::coordinator::CoordinatorService;
pub use services::dependency::GraphAnalyzer;
pub use services::worktree::GitDriver;
pub use storage::TaskStore;
pub use utils::error::{AppError, AppResult};
