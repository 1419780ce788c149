//! Tool Trait and Registry
//!
//! The unified `Tool` interface exposed over the transport, plus the
//! registry that owns the nine coordinator tools. Tools parse their JSON
//! arguments, run the blocking service call off the async executor, and
//! return a structured JSON result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::response::{
    ClaimTaskRequest, CleanupTaskRequest, CompleteTaskRequest, CreateTasksRequest,
    GetTaskRequest, ListTasksRequest, MergeTaskRequest, StartTaskRequest, UpdateProgressRequest,
};
use crate::services::coordinator::CoordinatorService;
use crate::utils::error::{AppError, AppResult};

/// Unified tool interface.
///
/// Each coordinator operation implements this trait, providing identity,
/// a JSON-schema input description, and execution logic.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool (e.g. "claim_task")
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does
    fn description(&self) -> &str;

    /// JSON schema describing the tool's input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given JSON arguments
    async fn execute(&self, args: Value) -> AppResult<Value>;
}

/// Registry of available tools with insertion-ordered iteration
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool; an existing tool with the same name is replaced
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions in registration order, as the transport lists them
    pub fn definitions(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> AppResult<Value> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(AppError::not_found(format!("Unknown tool: {}", name))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse tool arguments, treating absent arguments as an empty object
fn parse_args<T: DeserializeOwned>(args: Value) -> AppResult<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| AppError::validation(format!("Invalid tool arguments: {}", e)))
}

/// Run a blocking service call off the async executor and serialize the
/// result
async fn run_blocking<T, F>(f: F) -> AppResult<Value>
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("Tool execution panicked: {}", e)))??;
    Ok(serde_json::to_value(result)?)
}

// ── Coordinator tools ───────────────────────────────────────────────────

macro_rules! coordinator_tool {
    ($struct_name:ident, $tool_name:literal, $request:ty, $method:ident, $description:literal, $schema:expr) => {
        struct $struct_name {
            service: Arc<CoordinatorService>,
        }

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $tool_name
            }

            fn description(&self) -> &str {
                $description
            }

            fn input_schema(&self) -> Value {
                $schema
            }

            async fn execute(&self, args: Value) -> AppResult<Value> {
                let req: $request = parse_args(args)?;
                let service = self.service.clone();
                run_blocking(move || service.$method(req)).await
            }
        }
    };
}

coordinator_tool!(
    CreateTasksTool,
    "create_tasks",
    CreateTasksRequest,
    create_tasks,
    "Create a task group from a structured task list. Dependencies use 1-based sequence numbers; tasks with dependencies start out blocked.",
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string", "description": "Group title" },
            "description": { "type": "string", "description": "Group description" },
            "tasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": { "type": "string", "enum": ["high", "medium", "low"], "default": "medium" },
                        "depends_on": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "1-based sequence numbers of prerequisite tasks"
                        },
                        "file_patterns": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "pattern": { "type": "string" },
                                    "ownership": { "type": "string", "enum": ["exclusive", "shared"], "default": "exclusive" }
                                },
                                "required": ["pattern"]
                            }
                        }
                    },
                    "required": ["title"]
                }
            }
        },
        "required": ["title", "tasks"]
    })
);

coordinator_tool!(
    ListTasksTool,
    "list_tasks",
    ListTasksRequest,
    list_tasks,
    "List tasks with a status summary. Pending tasks report whether they can start.",
    json!({
        "type": "object",
        "properties": {
            "group_id": { "type": "string", "description": "Restrict to one group" },
            "status": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["pending", "blocked", "assigned", "in_progress", "in_review", "completed", "failed"]
                },
                "description": "Restrict to these statuses"
            }
        }
    })
);

coordinator_tool!(
    GetTaskTool,
    "get_task",
    GetTaskRequest,
    get_task,
    "Fetch one task with its dependencies, file ownership, and full progress log.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" }
        },
        "required": ["task_id"]
    })
);

coordinator_tool!(
    ClaimTaskTool,
    "claim_task",
    ClaimTaskRequest,
    claim_task,
    "Claim a pending task for a worker. Refused (success=false) when the task is taken, has unmet dependencies, or its file patterns are held by an in-progress task.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" },
            "agent_id": { "type": "string", "description": "Worker identity; generated when absent" }
        },
        "required": ["task_id"]
    })
);

coordinator_tool!(
    StartTaskTool,
    "start_task",
    StartTaskRequest,
    start_task,
    "Start a claimed task: creates its isolated worktree and branch, and returns the worker context.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" }
        },
        "required": ["task_id"]
    })
);

coordinator_tool!(
    UpdateProgressTool,
    "update_progress",
    UpdateProgressRequest,
    update_progress,
    "Record progress on an in-progress task. Changed files are scanned against other tasks' exclusive patterns; a rebase recommendation is computed best-effort.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" },
            "progress": { "type": "integer", "minimum": 0, "maximum": 100 },
            "note": { "type": "string" },
            "files_changed": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Paths touched since the last update"
            }
        },
        "required": ["task_id", "progress", "note"]
    })
);

coordinator_tool!(
    CompleteTaskTool,
    "complete_task",
    CompleteTaskRequest,
    complete_task,
    "Mark an in-progress task ready for merge (in_review) and unblock dependents whose prerequisites are now satisfied.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" },
            "summary": { "type": "string", "description": "Summary of the delivered work" },
            "files_changed": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["task_id", "summary"]
    })
);

coordinator_tool!(
    MergeTaskTool,
    "merge_task",
    MergeTaskRequest,
    merge_task,
    "Merge an in_review task's branch into trunk (squash by default). On conflict the task stays in_review and the conflicted paths are reported.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" },
            "strategy": { "type": "string", "enum": ["squash", "merge"], "default": "squash" }
        },
        "required": ["task_id"]
    })
);

coordinator_tool!(
    CleanupTaskTool,
    "cleanup_task",
    CleanupTaskRequest,
    cleanup_task,
    "Abandon a task: best-effort removal of its worktree and branch, then mark it failed.",
    json!({
        "type": "object",
        "properties": {
            "task_id": { "type": "string" },
            "reason": { "type": "string" }
        },
        "required": ["task_id"]
    })
);

/// Build the registry of the nine coordinator tools
pub fn coordinator_registry(service: Arc<CoordinatorService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CreateTasksTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(ListTasksTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(GetTaskTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(ClaimTaskTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(StartTaskTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(UpdateProgressTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(CompleteTaskTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(MergeTaskTool {
        service: service.clone(),
    }));
    registry.register(Arc::new(CleanupTaskTool { service }));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::worktree::GitDriver;
    use crate::storage::TaskStore;

    fn test_registry() -> ToolRegistry {
        let store = TaskStore::in_memory().unwrap();
        let dir = std::env::temp_dir();
        let service = Arc::new(CoordinatorService::new(store, GitDriver::open(dir)));
        coordinator_registry(service)
    }

    #[test]
    fn test_registry_has_all_nine_tools() {
        let registry = test_registry();
        assert_eq!(registry.len(), 9);
        assert_eq!(
            registry.names(),
            vec![
                "create_tasks",
                "list_tasks",
                "get_task",
                "claim_task",
                "start_task",
                "update_progress",
                "complete_task",
                "merge_task",
                "cleanup_task",
            ]
        );
    }

    #[test]
    fn test_definitions_are_serializable_and_ordered() {
        let registry = test_registry();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 9);
        for def in &defs {
            assert!(def["name"].is_string());
            assert!(def["description"].is_string());
            assert_eq!(def["inputSchema"]["type"], json!("object"));
        }
        assert_eq!(defs[0]["name"], json!("create_tasks"));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = test_registry();
        let err = registry.execute("no_such_tool", json!({})).await;
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_arguments() {
        let registry = test_registry();
        let err = registry.execute("get_task", json!({"bogus": 1})).await;
        assert!(err.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_list_through_tools() {
        let registry = test_registry();

        let created = registry
            .execute(
                "create_tasks",
                json!({
                    "title": "Blog",
                    "tasks": [
                        { "title": "DB Schema" },
                        { "title": "CRUD API", "depends_on": [1] }
                    ]
                }),
            )
            .await
            .unwrap();
        assert_eq!(created["tasks"][0]["status"], json!("pending"));
        assert_eq!(created["tasks"][1]["status"], json!("blocked"));

        let listing = registry
            .execute("list_tasks", json!({ "group_id": created["group_id"] }))
            .await
            .unwrap();
        assert_eq!(listing["summary"]["total"], json!(2));
        assert_eq!(listing["summary"]["pending"], json!(1));
        assert_eq!(listing["summary"]["blocked"], json!(1));
    }
}
