//! Tool Invocation Transport
//!
//! JSON-RPC 2.0 over stdio: protocol types, the tool trait and registry,
//! and the server loop.

pub mod protocol;
pub mod stdio;
pub mod tools;

pub use stdio::StdioServer;
pub use tools::{coordinator_registry, Tool, ToolRegistry};
