//! Coordinator Service
//!
//! The task state machine: composes the store, the dependency analyzer,
//! the ownership engine, and the git driver into the nine operations the
//! tool surface exposes. State-changing operations run inside immediate
//! write transactions so concurrent workers linearize.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::models::response::{
    ClaimOutcome, ClaimTaskRequest, CleanupOutcome, CleanupStatus, CleanupTaskRequest,
    CompleteTaskRequest, CompletionResult, ConflictDetail, CreateTasksRequest, CreatedTasks,
    DependencyInfo, DependencyRef, GetTaskRequest, ListTasksRequest, MergeOutcome, MergeStrategy,
    MergeTaskRequest, MergeVerdict, ProgressReport, StartContext, StartTaskRequest,
    StatusSummary, TaskDetail, TaskListing, TaskOverview, TaskSummary, UpdateProgressRequest,
};
use crate::models::task::{FileOwnership, ProgressEvent, Task, TaskStatus};
use crate::services::dependency::GraphAnalyzer;
use crate::services::ownership::{self, OwnedPatterns};
use crate::services::worktree::{GitDriver, GitMergeResult, GitMergeStrategy};
use crate::storage::{now_iso, NewProgress, NewTask, TaskPatch, TaskStore};
use crate::utils::error::{AppError, AppResult};

/// Directory under the repository root holding task worktrees
pub const WORKTREE_DIR: &str = ".worktrees";

/// Branch namespace for task branches
pub const BRANCH_PREFIX: &str = "task";

/// Maximum slug length in branch and worktree names
const SLUG_MAX_LEN: usize = 30;

/// Orchestrates the task lifecycle for one repository
pub struct CoordinatorService {
    store: TaskStore,
    git: GitDriver,
}

impl CoordinatorService {
    /// Create a service over an open store and a bound git driver
    pub fn new(store: TaskStore, git: GitDriver) -> Self {
        Self { store, git }
    }

    // ── create_tasks ────────────────────────────────────────────────────

    /// Atomically create a group with its tasks, dependencies, and file
    /// patterns. Invalid dependency references, cycles, and exclusive
    /// pattern overlaps are reported as warnings; the group is still
    /// created. Tasks with dependencies start out blocked.
    pub fn create_tasks(&self, req: CreateTasksRequest) -> AppResult<CreatedTasks> {
        if req.tasks.is_empty() {
            return Err(AppError::validation("create_tasks requires at least one task"));
        }

        let group_id = uuid::Uuid::new_v4().to_string();
        let mut warnings: Vec<String> = Vec::new();

        let result = self.store.write_tx(|tx| {
            TaskStore::create_group_in(tx, &group_id, &req.title, &req.description)?;

            // Create rows in sequence order, remembering sequence -> id
            let mut ids_by_sequence: Vec<String> = Vec::with_capacity(req.tasks.len());
            for (index, spec) in req.tasks.iter().enumerate() {
                let task = TaskStore::create_task_in(
                    tx,
                    &NewTask {
                        id: uuid::Uuid::new_v4().to_string(),
                        group_id: group_id.clone(),
                        sequence: (index + 1) as i64,
                        title: spec.title.clone(),
                        description: spec.description.clone(),
                        priority: spec.priority,
                        status: TaskStatus::Pending,
                    },
                )?;
                ids_by_sequence.push(task.id);
            }

            // Materialize dependencies, dropping references to unknown
            // sequences with a warning
            let mut has_deps = vec![false; req.tasks.len()];
            for (index, spec) in req.tasks.iter().enumerate() {
                for &dep_seq in &spec.depends_on {
                    let dep_index = dep_seq.checked_sub(1).and_then(|i| {
                        usize::try_from(i).ok().filter(|i| *i < ids_by_sequence.len())
                    });
                    match dep_index {
                        Some(dep_index) => {
                            TaskStore::add_dependency_in(
                                tx,
                                &ids_by_sequence[index],
                                &ids_by_sequence[dep_index],
                            )?;
                            has_deps[index] = true;
                        }
                        None => warnings.push(format!(
                            "Task {} ('{}') references unknown dependency sequence {}; edge dropped",
                            index + 1,
                            spec.title,
                            dep_seq
                        )),
                    }
                }
            }

            // Materialize file patterns
            for (index, spec) in req.tasks.iter().enumerate() {
                for pattern in &spec.file_patterns {
                    TaskStore::add_file_ownership_in(
                        tx,
                        &FileOwnership {
                            task_id: ids_by_sequence[index].clone(),
                            file_pattern: pattern.pattern.clone(),
                            ownership: pattern.ownership,
                        },
                    )?;
                }
            }

            // Cycle validation: warn, but keep the group
            let dep_map = TaskStore::group_dependency_map_in(tx, &group_id)?;
            let check = GraphAnalyzer::validate_no_cycles(&dep_map);
            if !check.valid {
                let sequences: Vec<String> = check
                    .cycle
                    .iter()
                    .filter_map(|id| ids_by_sequence.iter().position(|t| t == id))
                    .map(|index| format!("{}", index + 1))
                    .collect();
                warnings.push(format!(
                    "Circular dependency detected among tasks {}; they will never become claimable",
                    sequences.join(" -> ")
                ));
            }

            // Pairwise overlap check; the engine flags pairs where at
            // least one side is exclusive
            for i in 0..req.tasks.len() {
                let later_tasks: Vec<OwnedPatterns> = req.tasks[i + 1..]
                    .iter()
                    .zip(&ids_by_sequence[i + 1..])
                    .map(|(other, id)| OwnedPatterns {
                        task_id: id.clone(),
                        task_title: other.title.clone(),
                        patterns: other
                            .file_patterns
                            .iter()
                            .map(|p| FileOwnership {
                                task_id: id.clone(),
                                file_pattern: p.pattern.clone(),
                                ownership: p.ownership,
                            })
                            .collect(),
                    })
                    .collect();
                for pattern in &req.tasks[i].file_patterns {
                    let mine = [FileOwnership {
                        task_id: ids_by_sequence[i].clone(),
                        file_pattern: pattern.pattern.clone(),
                        ownership: pattern.ownership,
                    }];
                    for conflict in ownership::find_pattern_conflicts(&mine, &later_tasks) {
                        warnings.push(format!(
                            "File pattern overlap: '{}' ('{}') and '{}' ('{}')",
                            pattern.pattern,
                            req.tasks[i].title,
                            conflict.pattern,
                            conflict.task_title
                        ));
                    }
                }
            }

            // Dependency-bearing tasks wait for their prerequisites
            let mut summaries = Vec::with_capacity(req.tasks.len());
            for (index, id) in ids_by_sequence.iter().enumerate() {
                let task = if has_deps[index] {
                    TaskStore::update_task_in(
                        tx,
                        id,
                        &TaskPatch {
                            status: Some(TaskStatus::Blocked),
                            ..Default::default()
                        },
                    )?
                } else {
                    TaskStore::get_task_in(tx, id)?.ok_or_else(|| {
                        AppError::database("Task vanished during group creation")
                    })?
                };
                summaries.push(summary(&task, !has_deps[index]));
            }

            Ok(summaries)
        })?;

        info!(group_id = %group_id, tasks = result.len(), "created task group");
        Ok(CreatedTasks {
            group_id,
            tasks: result,
            warnings,
        })
    }

    // ── list_tasks / get_task ───────────────────────────────────────────

    /// List tasks matching the filters, with readiness for pending tasks
    /// and a status summary over the matches
    pub fn list_tasks(&self, req: ListTasksRequest) -> AppResult<TaskListing> {
        let tasks = self
            .store
            .list_tasks(req.group_id.as_deref(), req.status.as_deref())?;

        let mut listing = Vec::with_capacity(tasks.len());
        let mut counts = StatusSummary {
            total: tasks.len(),
            ..Default::default()
        };
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Blocked => counts.blocked += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::InReview => counts.in_review += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Assigned | TaskStatus::Failed => {}
            }

            let can_start = if task.status == TaskStatus::Pending {
                let deps = self.store.get_dependencies(&task.id)?;
                Some(deps.iter().all(|d| d.status == TaskStatus::Completed))
            } else {
                None
            };
            listing.push(TaskOverview {
                id: task.id.clone(),
                group_id: task.group_id.clone(),
                sequence: task.sequence,
                title: task.title.clone(),
                status: task.status,
                priority: task.priority,
                assigned_to: task.assigned_to.clone(),
                progress: task.progress,
                can_start,
            });
        }

        Ok(TaskListing {
            tasks: listing,
            summary: counts,
        })
    }

    /// Fetch one task with its dependency projection, ownership set, and
    /// full progress log
    pub fn get_task(&self, req: GetTaskRequest) -> AppResult<TaskDetail> {
        let task = self.require_task(&req.task_id)?;
        let dependencies = self
            .store
            .get_dependencies(&task.id)?
            .into_iter()
            .map(|d| DependencyInfo {
                sequence: d.sequence,
                title: d.title,
                status: d.status,
            })
            .collect();
        let file_ownership = self.store.get_file_ownership(&task.id)?;
        let progress_log = self.store.list_progress(&task.id)?;
        Ok(TaskDetail {
            task,
            dependencies,
            file_ownership,
            progress_log,
        })
    }

    // ── claim_task ──────────────────────────────────────────────────────

    /// Guarded transition pending -> assigned.
    ///
    /// Precondition failures return a structured refusal without mutating
    /// state. The whole check-and-set runs in one immediate transaction, so
    /// of two concurrent claims exactly one succeeds.
    pub fn claim_task(&self, req: ClaimTaskRequest) -> AppResult<ClaimOutcome> {
        let outcome = self.store.write_tx(|tx| {
            let task = match TaskStore::get_task_in(tx, &req.task_id)? {
                Some(task) => task,
                None => {
                    return Ok(ClaimOutcome::refused(format!(
                        "Task not found: {}",
                        req.task_id
                    )))
                }
            };

            if task.status != TaskStatus::Pending {
                return Ok(ClaimOutcome::refused(format!(
                    "Task #{} is not claimable (status: {})",
                    task.sequence, task.status
                )));
            }

            let deps = TaskStore::get_dependencies_in(tx, &task.id)?;
            let unmet: Vec<String> = deps
                .iter()
                .filter(|d| d.status != TaskStatus::Completed)
                .map(|d| format!("#{} ('{}')", d.sequence, d.title))
                .collect();
            if !unmet.is_empty() {
                return Ok(ClaimOutcome::refused(format!(
                    "Unmet dependencies: {} must be completed first",
                    unmet.join(", ")
                )));
            }

            let conflicts = TaskStore::find_ownership_conflicts_in(tx, &task.id)?;
            if let Some(conflict) = conflicts.first() {
                return Ok(ClaimOutcome::refused(format!(
                    "File ownership conflict: pattern '{}' is held by in-progress task #{} ('{}')",
                    conflict.pattern, conflict.task.sequence, conflict.task.title
                )));
            }

            let agent_id = match req.agent_id.as_deref() {
                Some(id) if !id.trim().is_empty() => id.to_string(),
                _ => generate_agent_id(),
            };

            let updated = TaskStore::update_task_in(
                tx,
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::Assigned),
                    assigned_to: Some(agent_id.clone()),
                    ..Default::default()
                },
            )?;
            TaskStore::append_progress_in(
                tx,
                &NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::Claimed,
                    message: format!("Task claimed by {}", agent_id),
                    metadata: Some(serde_json::json!({ "agent_id": agent_id.clone() })),
                },
            )?;
            Ok(ClaimOutcome::granted(updated, agent_id))
        })?;

        if outcome.success {
            info!(task_id = %req.task_id, agent = ?outcome.agent_id, "task claimed");
        }
        Ok(outcome)
    }

    // ── start_task ──────────────────────────────────────────────────────

    /// Guarded transition assigned -> in_progress.
    ///
    /// Creates the worktree and branch first; when the git driver fails the
    /// task record is untouched and remains assigned.
    pub fn start_task(&self, req: StartTaskRequest) -> AppResult<StartContext> {
        let task = self.require_task(&req.task_id)?;
        if task.status != TaskStatus::Assigned {
            return Err(AppError::validation(format!(
                "Cannot start task #{} in status '{}': claim it first",
                task.sequence, task.status
            )));
        }

        let slug = slugify(&task.title);
        let branch_name = format!("{}/task-{}-{}", BRANCH_PREFIX, task.sequence, slug);
        let worktree_path = self
            .git
            .repo_root()
            .join(WORKTREE_DIR)
            .join(format!("task-{}-{}", task.sequence, slug));

        self.git.create_worktree(&worktree_path, &branch_name)?;
        info!(task_id = %task.id, branch = %branch_name, "worktree created");

        let worktree_str = worktree_path.to_string_lossy().to_string();
        let updated = self.store.write_tx(|tx| {
            let updated = TaskStore::update_task_in(
                tx,
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    branch_name: Some(branch_name.clone()),
                    worktree_path: Some(worktree_str.clone()),
                    started_at: Some(now_iso()),
                    ..Default::default()
                },
            )?;
            TaskStore::append_progress_in(
                tx,
                &NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::Started,
                    message: format!("Started work on branch {}", branch_name),
                    metadata: Some(serde_json::json!({
                        "branch_name": branch_name.clone(),
                        "worktree_path": worktree_str.clone(),
                    })),
                },
            )?;
            Ok(updated)
        })?;

        let completed_dependencies = self
            .store
            .get_dependencies(&task.id)?
            .into_iter()
            .filter(|d| d.status == TaskStatus::Completed)
            .map(|d| DependencyRef {
                title: d.title,
                branch_name: d.branch_name,
            })
            .collect();
        let file_patterns = self.store.get_file_ownership(&task.id)?;

        Ok(StartContext {
            description: updated.description.clone(),
            branch_name,
            worktree_path: worktree_str,
            task: updated,
            file_patterns,
            completed_dependencies,
        })
    }

    // ── update_progress ─────────────────────────────────────────────────

    /// Non-transitioning progress write with best-effort conflict and
    /// rebase advice. Repeated calls converge: progress and note overwrite,
    /// log entries accumulate.
    pub fn update_progress(&self, req: UpdateProgressRequest) -> AppResult<ProgressReport> {
        let task = self.require_task(&req.task_id)?;
        if req.progress > 100 {
            return Err(AppError::validation(format!(
                "Progress must be between 0 and 100 (got {})",
                req.progress
            )));
        }

        let conflict_warnings = match &req.files_changed {
            Some(files) => {
                let others = self.in_progress_peers(&task)?;
                ownership::check_file_conflicts(files, &others)
            }
            None => Vec::new(),
        };

        // Rebase advice is best effort: git failures are swallowed
        let rebase_recommended = match &task.branch_name {
            Some(branch) => self
                .git
                .latest_commit(Some(branch))
                .and_then(|tip| self.git.trunk_ahead_of(&tip))
                .unwrap_or(false),
            None => false,
        };

        let updated = self.store.write_tx(|tx| {
            let updated = TaskStore::update_task_in(
                tx,
                &task.id,
                &TaskPatch {
                    progress: Some(req.progress),
                    progress_note: Some(req.note.clone()),
                    ..Default::default()
                },
            )?;
            TaskStore::append_progress_in(
                tx,
                &NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::ProgressUpdate,
                    message: req.note.clone(),
                    metadata: Some(serde_json::json!({
                        "progress": req.progress,
                        "files_changed": req.files_changed.clone(),
                        "rebase_recommended": rebase_recommended,
                    })),
                },
            )?;
            Ok(updated)
        })?;

        Ok(ProgressReport {
            task: updated,
            conflict_warnings,
            rebase_recommended,
        })
    }

    // ── complete_task ───────────────────────────────────────────────────

    /// Guarded transition in_progress -> in_review.
    ///
    /// Downstream tasks unblock against a completed set that includes
    /// in_review tasks: dependents may start before the upstream branch
    /// merges, since every worker has its own worktree.
    pub fn complete_task(&self, req: CompleteTaskRequest) -> AppResult<CompletionResult> {
        let (updated, unlocked) = self.store.write_tx(|tx| {
            let task = TaskStore::get_task_in(tx, &req.task_id)?
                .ok_or_else(|| AppError::not_found(format!("Task not found: {}", req.task_id)))?;
            if task.status != TaskStatus::InProgress {
                return Err(AppError::validation(format!(
                    "Cannot complete task #{} in status '{}': only in_progress tasks complete",
                    task.sequence, task.status
                )));
            }

            let updated = TaskStore::update_task_in(
                tx,
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::InReview),
                    completed_at: Some(now_iso()),
                    progress: Some(100),
                    progress_note: Some(req.summary.clone()),
                    ..Default::default()
                },
            )?;

            let unlocked = unlock_blocked_in(
                tx,
                &task.group_id,
                &task.id,
                &[TaskStatus::Completed, TaskStatus::InReview],
            )?;

            TaskStore::append_progress_in(
                tx,
                &NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::Completed,
                    message: req.summary.clone(),
                    metadata: Some(serde_json::json!({
                        "files_changed": req.files_changed.clone(),
                        "unlocked": unlocked.iter().map(|t| t.sequence).collect::<Vec<_>>(),
                    })),
                },
            )?;
            Ok((updated, unlocked))
        })?;

        info!(task_id = %updated.id, unlocked = unlocked.len(), "task completed, awaiting merge");
        Ok(CompletionResult {
            task: updated,
            unlocked: unlocked.iter().map(|t| summary(t, true)).collect(),
        })
    }

    // ── merge_task ──────────────────────────────────────────────────────

    /// Guarded transition in_review -> completed, or a conflict report.
    ///
    /// Requires the repository HEAD to be on trunk. On conflict the task
    /// stays in_review and the merge is left in place for the caller to
    /// resolve or abort.
    pub fn merge_task(&self, req: MergeTaskRequest) -> AppResult<MergeOutcome> {
        let current = self.git.current_branch()?;
        if current != "main" && current != "master" {
            return Err(AppError::validation(format!(
                "merge_task requires the repository to be on trunk (currently on '{}')",
                current
            )));
        }

        let task = self.require_task(&req.task_id)?;
        if task.status != TaskStatus::InReview {
            return Err(AppError::validation(format!(
                "Cannot merge task #{} in status '{}': only in_review tasks merge",
                task.sequence, task.status
            )));
        }
        let branch = task.branch_name.clone().ok_or_else(|| {
            AppError::validation(format!(
                "Task #{} has no recorded branch to merge",
                task.sequence
            ))
        })?;

        let strategy = match req.strategy {
            MergeStrategy::Squash => GitMergeStrategy::Squash,
            MergeStrategy::Merge => GitMergeStrategy::Merge,
        };

        match self.git.merge(&branch, strategy)? {
            GitMergeResult::Clean => {
                let (updated, unlocked) = self.store.write_tx(|tx| {
                    let updated = TaskStore::update_task_in(
                        tx,
                        &task.id,
                        &TaskPatch {
                            status: Some(TaskStatus::Completed),
                            merged_at: Some(now_iso()),
                            ..Default::default()
                        },
                    )?;
                    let unlocked =
                        unlock_blocked_in(tx, &task.group_id, &task.id, &[TaskStatus::Completed])?;
                    Ok((updated, unlocked))
                })?;

                let cleanup = self.cleanup_artifacts(&task);
                self.store.append_progress(&NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::Merged,
                    message: format!("Merged '{}' into trunk ({})", branch, req.strategy),
                    metadata: Some(serde_json::json!({
                        "strategy": req.strategy,
                        "worktree_removed": cleanup.worktree_removed,
                        "branch_deleted": cleanup.branch_deleted,
                        "unlocked": unlocked.iter().map(|t| t.sequence).collect::<Vec<_>>(),
                    })),
                })?;

                info!(task_id = %task.id, branch = %branch, "task merged to trunk");
                Ok(MergeOutcome {
                    merge_result: MergeVerdict::Clean,
                    task: updated,
                    conflicts: Vec::new(),
                    unlocked: unlocked.iter().map(|t| summary(t, true)).collect(),
                    cleanup: Some(cleanup),
                })
            }
            GitMergeResult::Conflict(paths) => {
                self.store.append_progress(&NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::ConflictDetected,
                    message: format!(
                        "Merge of '{}' left {} conflicted file(s)",
                        branch,
                        paths.len()
                    ),
                    metadata: Some(serde_json::json!({ "conflicts": paths.clone() })),
                })?;

                warn!(task_id = %task.id, files = paths.len(), "merge conflict detected");
                let conflicts = paths
                    .into_iter()
                    .map(|file| ConflictDetail {
                        description: "Both trunk and the task branch modified this file"
                            .to_string(),
                        suggestion: format!(
                            "Resolve '{}' by hand, then commit the merge or abort it",
                            file
                        ),
                        auto_resolvable: false,
                        file,
                    })
                    .collect();
                Ok(MergeOutcome {
                    merge_result: MergeVerdict::Conflict,
                    task,
                    conflicts,
                    unlocked: Vec::new(),
                    cleanup: None,
                })
            }
        }
    }

    // ── cleanup_task ────────────────────────────────────────────────────

    /// Terminal transition from any non-terminal state to failed.
    ///
    /// Worktree and branch removal are best effort; their outcome is
    /// reported rather than raised.
    pub fn cleanup_task(&self, req: CleanupTaskRequest) -> AppResult<CleanupOutcome> {
        let task = self.require_task(&req.task_id)?;
        if task.status.is_terminal() {
            return Err(AppError::validation(format!(
                "Cannot clean up task #{}: already in terminal status '{}'",
                task.sequence, task.status
            )));
        }

        let cleaned = self.cleanup_artifacts(&task);
        let reason = req
            .reason
            .clone()
            .unwrap_or_else(|| "Task abandoned".to_string());

        let updated = self.store.write_tx(|tx| {
            let updated = TaskStore::update_task_in(
                tx,
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::Failed),
                    ..Default::default()
                },
            )?;
            TaskStore::append_progress_in(
                tx,
                &NewProgress {
                    task_id: task.id.clone(),
                    event: ProgressEvent::Failed,
                    message: reason.clone(),
                    metadata: Some(serde_json::json!({
                        "reason": reason.clone(),
                        "worktree_removed": cleaned.worktree_removed,
                        "branch_deleted": cleaned.branch_deleted,
                    })),
                },
            )?;
            Ok(updated)
        })?;

        info!(task_id = %task.id, reason = %reason, "task failed and cleaned up");
        Ok(CleanupOutcome {
            task: updated,
            cleaned,
        })
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn require_task(&self, id: &str) -> AppResult<Task> {
        self.store
            .get_task(id)?
            .ok_or_else(|| AppError::not_found(format!("Task not found: {}", id)))
    }

    /// Ownership claims of other in-progress tasks in the same group
    fn in_progress_peers(&self, task: &Task) -> AppResult<Vec<OwnedPatterns>> {
        let peers = self
            .store
            .list_tasks(Some(&task.group_id), Some(&[TaskStatus::InProgress]))?;
        let mut others = Vec::new();
        for peer in peers.into_iter().filter(|p| p.id != task.id) {
            let patterns = self.store.get_file_ownership(&peer.id)?;
            others.push(OwnedPatterns {
                task_id: peer.id,
                task_title: peer.title,
                patterns,
            });
        }
        Ok(others)
    }

    /// Best-effort removal of a task's worktree and branch; failures are
    /// reported as warnings
    fn cleanup_artifacts(&self, task: &Task) -> CleanupStatus {
        let mut status = CleanupStatus::default();

        if let Some(ref worktree) = task.worktree_path {
            let path = PathBuf::from(worktree);
            match self.git.worktree_exists(&path) {
                Ok(true) => match self.git.remove_worktree(&path) {
                    Ok(()) => status.worktree_removed = true,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "worktree removal failed");
                        status
                            .warnings
                            .push(format!("Failed to remove worktree: {}", e));
                    }
                },
                Ok(false) => {}
                Err(e) => status
                    .warnings
                    .push(format!("Failed to inspect worktrees: {}", e)),
            }
        }

        if let Some(ref branch) = task.branch_name {
            match self.git.branch_exists(branch) {
                Ok(true) => match self.git.delete_branch(branch) {
                    Ok(()) => status.branch_deleted = true,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "branch deletion failed");
                        status
                            .warnings
                            .push(format!("Failed to delete branch: {}", e));
                    }
                },
                Ok(false) => {}
                Err(e) => status
                    .warnings
                    .push(format!("Failed to inspect branches: {}", e)),
            }
        }

        status
    }
}

/// Transition blocked tasks whose prerequisites are now satisfied.
///
/// The completed set is drawn from `set_statuses` (excluding the source
/// task, which `unlocked_by` injects itself). Returns the tasks moved to
/// pending, in sequence order.
fn unlock_blocked_in(
    tx: &rusqlite::Transaction<'_>,
    group_id: &str,
    source_task_id: &str,
    set_statuses: &[TaskStatus],
) -> AppResult<Vec<Task>> {
    let dep_map = TaskStore::group_dependency_map_in(tx, group_id)?;
    let done: HashSet<String> = TaskStore::list_tasks_in(tx, Some(group_id), Some(set_statuses))?
        .into_iter()
        .map(|t| t.id)
        .filter(|id| id != source_task_id)
        .collect();

    let mut unlocked = Vec::new();
    for id in GraphAnalyzer::unlocked_by(source_task_id, &dep_map, &done) {
        if let Some(task) = TaskStore::get_task_in(tx, &id)? {
            if task.status == TaskStatus::Blocked {
                let updated = TaskStore::update_task_in(
                    tx,
                    &id,
                    &TaskPatch {
                        status: Some(TaskStatus::Pending),
                        ..Default::default()
                    },
                )?;
                unlocked.push(updated);
            }
        }
    }
    unlocked.sort_by_key(|t| t.sequence);
    Ok(unlocked)
}

fn summary(task: &Task, can_start: bool) -> TaskSummary {
    TaskSummary {
        id: task.id.clone(),
        sequence: task.sequence,
        title: task.title.clone(),
        status: task.status,
        priority: task.priority,
        can_start,
    }
}

/// Opaque short worker token for claims without a caller-supplied identity
fn generate_agent_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("agent-{}", &token[..8])
}

/// Lowercased strict slug for branch and worktree names: alphanumerics
/// kept, separator runs collapse to single dashes, everything else
/// dropped, capped at 30 characters
fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' || c == '/' {
            pending_dash = true;
        }
    }
    slug.truncate(SLUG_MAX_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("DB Schema"), "db-schema");
        assert_eq!(slugify("CRUD API"), "crud-api");
        assert_eq!(slugify("Auth"), "auth");
    }

    #[test]
    fn test_slugify_strict_drops_punctuation() {
        assert_eq!(slugify("Add @special#chars!"), "add-specialchars");
        assert_eq!(slugify("feature/add-button"), "feature-add-button");
    }

    #[test]
    fn test_slugify_collapses_separator_runs() {
        assert_eq!(slugify("a  -  b"), "a-b");
        assert_eq!(slugify("--lead and trail--"), "lead-and-trail");
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "a very long task title that keeps going and going";
        let slug = slugify(long);
        assert!(slug.len() <= 30);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "task");
        assert_eq!(slugify(""), "task");
    }

    #[test]
    fn test_generate_agent_id_shape() {
        let id = generate_agent_id();
        assert!(id.starts_with("agent-"));
        assert_eq!(id.len(), "agent-".len() + 8);
        assert_ne!(id, generate_agent_id());
    }
}
