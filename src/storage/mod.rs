//! Storage Layer
//!
//! SQLite-backed persistence for all coordinator state.

pub mod database;

pub use database::{now_iso, DbPool, NewProgress, NewTask, TaskPatch, TaskStore};
