//! Domains module containing business logic organized by bounded contexts.
//!
//! - **search**: grounded web search against the generative backend
//! - **tools**: MCP tools exposed to clients, and their registry

pub mod search;
pub mod tools;
