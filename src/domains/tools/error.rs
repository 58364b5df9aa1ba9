//! Tool-specific error types.

use thiserror::Error;

/// Errors that can occur during tool registration and lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    Duplicate(String),

    /// The requested tool was not found.
    #[error("Unknown tool: {0}")]
    Unknown(String),
}

impl ToolError {
    /// Create a new "duplicate tool" error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::Duplicate(name.into())
    }

    /// Create a new "unknown tool" error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::Unknown(name.into())
    }
}
