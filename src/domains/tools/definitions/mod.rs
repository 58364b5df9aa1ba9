//! Tool definitions module.
//!
//! This module exports all available tool definitions.
//! Each tool is defined in its own file for better maintainability.

pub mod search;

pub use search::{DecodeError, SearchParams, SearchTool, decode_query};
