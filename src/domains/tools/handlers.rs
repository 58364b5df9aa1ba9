//! Tool handler abstraction.
//!
//! Every callable tool implements [`ToolHandler`]. A handler always resolves
//! to exactly one [`InvocationResult`]; business failures are values, not
//! errors, so they travel back to the client as a normal protocol response.

use rmcp::model::{CallToolResult, Content, JsonObject};

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    /// The tool produced a payload (plain text or serialized JSON).
    Success(String),

    /// The tool failed with a human-readable message.
    Failure(String),
}

impl InvocationResult {
    /// Create a successful result.
    pub fn success(payload: impl Into<String>) -> Self {
        Self::Success(payload.into())
    }

    /// Create a failed result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Whether this is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

impl From<InvocationResult> for CallToolResult {
    fn from(result: InvocationResult) -> Self {
        match result {
            InvocationResult::Success(payload) => CallToolResult::success(vec![Content::text(payload)]),
            InvocationResult::Failure(message) => CallToolResult::error(vec![Content::text(message)]),
        }
    }
}

/// Trait implemented by every tool exposed by the server.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments.
    ///
    /// Implementations must not panic on bad input; they report it as a
    /// [`InvocationResult::Failure`].
    async fn call(&self, arguments: JsonObject) -> InvocationResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_maps_to_non_error_result() {
        let result: CallToolResult = InvocationResult::success("payload").into();
        assert_eq!(result.is_error, Some(false));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "payload");
    }

    #[test]
    fn test_failure_maps_to_error_result() {
        let result: CallToolResult = InvocationResult::failure("boom").into();
        assert_eq!(result.is_error, Some(true));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "boom");
    }
}
