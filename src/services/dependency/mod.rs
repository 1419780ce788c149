//! Dependency Analysis
//!
//! Cycle detection, readiness evaluation, and unblock propagation.

pub mod analyzer;

pub use analyzer::{CycleCheck, DependencyMap, GraphAnalyzer, GraphError};
