//! Path Utilities
//!
//! Resolves the on-disk location of the task store. The default lives under
//! `.tasks/` in the working directory; `TASK_DB_PATH` overrides it.

use std::path::{Path, PathBuf};

use crate::utils::error::AppResult;

/// Environment variable overriding the store location
pub const DB_PATH_ENV: &str = "TASK_DB_PATH";

/// Directory holding the store when no override is set
pub const DEFAULT_DB_DIR: &str = ".tasks";

/// Store file name
pub const DEFAULT_DB_FILE: &str = "tasks.db";

/// Resolve the store path: `TASK_DB_PATH` if set, else `{cwd}/.tasks/tasks.db`
pub fn database_path() -> AppResult<PathBuf> {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(DEFAULT_DB_DIR).join(DEFAULT_DB_FILE))
}

/// Ensure the parent directory of a file path exists, creating it if necessary
pub fn ensure_parent_dir(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Resolve a possibly-relative path against the working directory
pub fn absolute(path: &Path) -> AppResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
