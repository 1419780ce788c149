//! Task Coordination
//!
//! The state machine orchestrating claims, worktree lifecycles, progress
//! tracking, and trunk integration.

pub mod service;


pub use service::{CoordinatorService, BRANCH_PREFIX, WORKTREE_DIR};
