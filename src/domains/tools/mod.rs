//! Tools domain module.
//!
//! This module handles all tool-related functionality for the MCP server.
//! Tools are executable functions that can be called by MCP clients.
//!
//! ## Architecture
//!
//! - `definitions/` - Individual tool implementations (one file per tool)
//! - `handlers.rs` - The `ToolHandler` trait and `InvocationResult`
//! - `registry.rs` - Central tool registry used by the session engine
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `definitions/` (e.g., `my_tool.rs`)
//! 2. Implement `ToolHandler` and a `descriptor()` for it
//! 3. Export in `definitions/mod.rs`
//! 4. Register it in `build_tool_registry()`

pub mod definitions;
mod error;
mod handlers;
mod registry;

pub use error::ToolError;
pub use handlers::{InvocationResult, ToolHandler};
pub use registry::{ToolDescriptor, ToolRegistry, build_tool_registry};
