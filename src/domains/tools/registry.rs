//! Tool Registry - central registration and lookup for all tools.
//!
//! Tools are registered once at startup, before any transport accepts
//! requests. After that the registry is only read, so it can be shared
//! behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use tracing::debug;

use super::definitions::SearchTool;
use super::error::ToolError;
use super::handlers::ToolHandler;
use crate::domains::search::SearchService;

// ============================================================================
// Tool Descriptor
// ============================================================================

/// Name, description and parameter schema of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Arc<JsonObject>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonObject,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: Arc::new(input_schema),
        }
    }

    /// Create a Tool model for this descriptor (metadata).
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone().into(),
            description: Some(self.description.clone().into()),
            input_schema: self.input_schema.clone(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Tool registry - maps tool names to descriptors and handlers.
///
/// Listing preserves registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::duplicate(descriptor.name));
        }

        debug!("Registering tool: {}", descriptor.name);
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Look up the handler registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>, ToolError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].handler.clone())
            .ok_or_else(|| ToolError::unknown(name))
    }

    /// Get all tool names, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|t| t.descriptor.name.as_str())
            .collect()
    }

    /// Get all tools as Tool models (metadata).
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.descriptor.to_tool()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build the registry with every tool this server exposes.
pub fn build_tool_registry(search: Arc<SearchService>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    let search_tool = SearchTool::new(search);
    registry.register(search_tool.descriptor(), Arc::new(search_tool))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::handlers::InvocationResult;
    use crate::domains::tools::definitions::search::tests::{RecordingBackend, answer, defaults};

    struct Echo(&'static str);

    #[async_trait::async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _arguments: JsonObject) -> InvocationResult {
            InvocationResult::success(self.0)
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{name} tool"), JsonObject::new())
    }

    #[tokio::test]
    async fn test_resolve_returns_registered_handler() {
        let mut registry = ToolRegistry::new();
        registry
            .register(descriptor("alpha"), Arc::new(Echo("a")))
            .unwrap();
        registry
            .register(descriptor("beta"), Arc::new(Echo("b")))
            .unwrap();

        let handler = registry.resolve("beta").unwrap();
        assert_eq!(
            handler.call(JsonObject::new()).await,
            InvocationResult::success("b")
        );
        assert_eq!(registry.tool_names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry
            .register(descriptor("alpha"), Arc::new(Echo("a")))
            .unwrap();

        let err = registry
            .register(descriptor("alpha"), Arc::new(Echo("other")))
            .unwrap_err();
        assert_eq!(err, ToolError::duplicate("alpha"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.resolve("missing").err(),
            Some(ToolError::unknown("missing"))
        );
    }

    #[test]
    fn test_build_registry_exposes_search() {
        let backend = Arc::new(RecordingBackend::new(answer));
        let service = Arc::new(SearchService::new(backend, defaults()));
        let registry = build_tool_registry(service).unwrap();

        assert_eq!(registry.tool_names(), vec!["search"]);
        let tools = registry.list_tools();
        assert_eq!(tools[0].name, "search");
        assert!(tools[0].description.is_some());
    }
}
