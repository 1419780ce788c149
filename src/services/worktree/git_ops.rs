//! Git Operations
//!
//! Safe wrapper around the git CLI for worktree and merge management.
//! Every method either succeeds or leaves the repository in a state the
//! caller can recover from (removing leftover worktrees, aborting merges).

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::utils::error::{AppError, AppResult};

/// Result of a git command execution
#[derive(Debug)]
pub struct GitResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitResult {
    /// Check if the command was successful and return stdout or error
    pub fn into_result(self) -> AppResult<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(AppError::command(format!(
                "Git command failed (exit {}): {}",
                self.exit_code,
                self.stderr.trim()
            )))
        }
    }
}

/// How a task branch is folded into trunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitMergeStrategy {
    /// Regular merge commit
    Merge,
    /// Collapse the branch into a single commit
    Squash,
}

/// Result of a merge attempt
#[derive(Debug)]
pub enum GitMergeResult {
    Clean,
    /// Unmerged paths left in the working tree
    Conflict(Vec<String>),
}

/// Information about a git worktree
#[derive(Debug, Default, Clone)]
pub struct WorktreeInfo {
    pub path: String,
    pub head: String,
    pub branch: String,
    pub is_bare: bool,
    pub is_detached: bool,
    pub is_prunable: bool,
}

/// Git driver bound to a single repository root
#[derive(Debug, Clone)]
pub struct GitDriver {
    repo_root: PathBuf,
}

impl GitDriver {
    /// Discover the repository containing `cwd` and bind to its root
    pub fn discover(cwd: &Path) -> AppResult<Self> {
        let root = Self::exec_in(cwd, &["rev-parse", "--show-toplevel"])?
            .into_result()
            .map_err(|e| {
                AppError::command(format!(
                    "Not inside a git repository ({}): {}",
                    cwd.display(),
                    e
                ))
            })?;
        Ok(Self {
            repo_root: PathBuf::from(root.trim()),
        })
    }

    /// Bind to a known repository root without discovery
    pub fn open(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// The repository root this driver operates on
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Execute a git command in the given directory
    fn exec_in(cwd: &Path, args: &[&str]) -> AppResult<GitResult> {
        debug!(?args, cwd = %cwd.display(), "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            // Disable interactive prompts to avoid hanging automation flows
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .output()
            .map_err(|e| AppError::command(format!("Failed to execute git: {}", e)))?;

        Ok(GitResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Execute a git command at the repository root
    fn execute(&self, args: &[&str]) -> AppResult<GitResult> {
        Self::exec_in(&self.repo_root, args)
    }

    /// Get the current branch name at the repository root
    pub fn current_branch(&self) -> AppResult<String> {
        self.execute(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .into_result()
            .map(|s| s.trim().to_string())
    }

    /// Whether HEAD is on the trunk branch (`main` or `master`)
    pub fn on_trunk(&self) -> AppResult<bool> {
        let branch = self.current_branch()?;
        Ok(branch == "main" || branch == "master")
    }

    /// The trunk branch present in this repository, `main` before `master`
    pub fn trunk_branch(&self) -> AppResult<String> {
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        Err(AppError::not_found(
            "No trunk branch: neither 'main' nor 'master' exists",
        ))
    }

    /// Check if a branch exists locally
    pub fn branch_exists(&self, branch: &str) -> AppResult<bool> {
        let result = self.execute(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", branch),
        ])?;
        Ok(result.success)
    }

    /// Commit id of a reference, HEAD when absent
    pub fn latest_commit(&self, reference: Option<&str>) -> AppResult<String> {
        self.execute(&["rev-parse", reference.unwrap_or("HEAD")])?
            .into_result()
            .map(|s| s.trim().to_string())
    }

    /// Whether trunk has commits newer than the given commit
    pub fn trunk_ahead_of(&self, commit: &str) -> AppResult<bool> {
        let trunk = self.trunk_branch()?;
        let range = format!("{}..{}", commit, trunk);
        let count = self
            .execute(&["rev-list", "--count", &range])?
            .into_result()?;
        let ahead: u64 = count
            .trim()
            .parse()
            .map_err(|e| AppError::command(format!("Unparseable rev-list count: {}", e)))?;
        Ok(ahead > 0)
    }

    /// Create a worktree at `path` on a brand-new branch.
    ///
    /// Single `worktree add -b` invocation: on failure git guarantees
    /// neither the worktree nor the branch persists. Existing branches or
    /// worktree directories are rejected up front.
    pub fn create_worktree(&self, path: &Path, new_branch: &str) -> AppResult<()> {
        if path.exists() {
            return Err(AppError::validation(format!(
                "Worktree directory already exists: {}",
                path.display()
            )));
        }
        if self.branch_exists(new_branch)? {
            return Err(AppError::validation(format!(
                "Branch already exists: {}",
                new_branch
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy();
        self.execute(&["worktree", "add", "-b", new_branch, &path_str])?
            .into_result()?;
        Ok(())
    }

    /// Forcefully remove a worktree, then prune stale registrations
    pub fn remove_worktree(&self, path: &Path) -> AppResult<()> {
        let path_str = path.to_string_lossy();
        self.execute(&["worktree", "remove", "--force", &path_str])?
            .into_result()?;
        self.execute(&["worktree", "prune"])?.into_result()?;
        Ok(())
    }

    /// Forcefully delete a local branch
    pub fn delete_branch(&self, branch: &str) -> AppResult<()> {
        self.execute(&["branch", "-D", branch])?.into_result()?;
        Ok(())
    }

    /// Whether a worktree at `path` is registered
    pub fn worktree_exists(&self, path: &Path) -> AppResult<bool> {
        let target = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let found = self.list_worktrees()?.into_iter().any(|wt| {
            let listed = PathBuf::from(&wt.path);
            listed
                .canonicalize()
                .unwrap_or(listed)
                == target
        });
        Ok(found)
    }

    /// List all worktrees registered for the repository
    pub fn list_worktrees(&self) -> AppResult<Vec<WorktreeInfo>> {
        let output = self
            .execute(&["worktree", "list", "--porcelain"])?
            .into_result()?;

        let mut worktrees = Vec::new();
        let mut current = WorktreeInfo::default();

        for line in output.lines() {
            if line.starts_with("worktree ") {
                if !current.path.is_empty() {
                    worktrees.push(current);
                    current = WorktreeInfo::default();
                }
                current.path = line.strip_prefix("worktree ").unwrap_or("").to_string();
            } else if line.starts_with("HEAD ") {
                current.head = line.strip_prefix("HEAD ").unwrap_or("").to_string();
            } else if line.starts_with("branch ") {
                current.branch = line
                    .strip_prefix("branch refs/heads/")
                    .unwrap_or(line.strip_prefix("branch ").unwrap_or(""))
                    .to_string();
            } else if line == "bare" {
                current.is_bare = true;
            } else if line == "detached" {
                current.is_detached = true;
            } else if line.starts_with("prunable") {
                current.is_prunable = true;
            }
        }

        if !current.path.is_empty() {
            worktrees.push(current);
        }

        Ok(worktrees)
    }

    /// Merge a branch into the current branch.
    ///
    /// Squash merges stage the combined diff and commit it in one step. On
    /// failure with unmerged paths in the working tree those paths are
    /// returned; other failures surface the git stderr.
    pub fn merge(&self, branch: &str, strategy: GitMergeStrategy) -> AppResult<GitMergeResult> {
        let result = match strategy {
            GitMergeStrategy::Squash => self.execute(&["merge", "--squash", branch])?,
            GitMergeStrategy::Merge => {
                let message = format!("Merge branch '{}'", branch);
                self.execute(&["merge", "--no-ff", "-m", &message, branch])?
            }
        };

        if result.success {
            if strategy == GitMergeStrategy::Squash {
                let message = format!("Merge branch '{}' (squash)", branch);
                let commit = self.execute(&["commit", "-m", &message])?;
                if !commit.success {
                    // A squash of an empty diff stages nothing to commit
                    let combined = format!("{}{}", commit.stdout, commit.stderr);
                    if !combined.contains("nothing to commit") {
                        return Err(AppError::command(format!(
                            "Squash commit failed: {}",
                            commit.stderr.trim()
                        )));
                    }
                }
            }
            return Ok(GitMergeResult::Clean);
        }

        let conflicts = self.conflicting_files()?;
        if conflicts.is_empty() {
            Err(AppError::command(format!(
                "Git merge failed (exit {}): {}",
                result.exit_code,
                result.stderr.trim()
            )))
        } else {
            Ok(GitMergeResult::Conflict(conflicts))
        }
    }

    /// Abort a merge in progress.
    ///
    /// A conflicted squash merge sets no MERGE_HEAD, so `merge --abort`
    /// refuses; `reset --merge` clears that state instead.
    pub fn abort_merge(&self) -> AppResult<()> {
        let result = self.execute(&["merge", "--abort"])?;
        if result.success {
            return Ok(());
        }
        self.execute(&["reset", "--merge"])?.into_result()?;
        Ok(())
    }

    /// Unmerged paths in the working tree
    pub fn conflicting_files(&self) -> AppResult<Vec<String>> {
        let output = self
            .execute(&["diff", "--name-only", "--diff-filter=U"])?
            .into_result()?;
        Ok(output
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}
