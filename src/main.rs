//! task-fleet server entry point.
//!
//! Binds the store and git driver to the working directory and serves the
//! tool surface over stdio. Logs go to stderr; stdout carries the protocol.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use task_fleet::server::{coordinator_registry, StdioServer};
use task_fleet::services::coordinator::CoordinatorService;
use task_fleet::services::worktree::GitDriver;
use task_fleet::storage::TaskStore;
use task_fleet::utils::error::AppResult;
use task_fleet::utils::paths;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let db_path = paths::database_path()?;
    let store = TaskStore::shared(&db_path)?;
    info!(path = %db_path.display(), "task store opened");

    let cwd = std::env::current_dir()?;
    let git = GitDriver::discover(&cwd)?;
    info!(root = %git.repo_root().display(), "repository discovered");

    let service = Arc::new(CoordinatorService::new(store, git));
    let registry = coordinator_registry(service);

    info!("serving task coordination tools on stdio");
    StdioServer::new(registry).run().await
}
