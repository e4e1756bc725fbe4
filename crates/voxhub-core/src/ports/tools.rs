//! Tool execution port.

use async_trait::async_trait;
use serde_json::Value;

use super::{ProviderError, ToolSpec};

/// Result of one tool invocation, rendered as text for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A set of tools the agent may call.
///
/// `specs` is a snapshot; executors that discover tools asynchronously
/// return an empty list until discovery finishes.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn call(&self, name: &str, arguments: Value) -> Result<ToolOutput, ProviderError>;

    /// Whether this executor serves `name`.
    fn handles(&self, name: &str) -> bool {
        self.specs().iter().any(|spec| spec.name == name)
    }
}
