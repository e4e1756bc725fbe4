//! Device tools exposed through the [`ToolExecutor`] port.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use voxhub_core::{ProviderError, ToolExecutor, ToolOutput, ToolSpec};

use crate::client::McpClient;
use crate::error::McpError;

/// Tools discovered on a device, callable by the agent.
///
/// Empty until [`discover`](Self::discover) succeeds.
pub struct DeviceTools {
    client: McpClient,
    specs: RwLock<Vec<ToolSpec>>,
}

impl DeviceTools {
    #[must_use]
    pub const fn new(client: McpClient) -> Self {
        Self {
            client,
            specs: RwLock::new(Vec::new()),
        }
    }

    /// Initialize the session and fetch the tool list.
    ///
    /// Returns the number of tools discovered.
    pub async fn discover(&self) -> Result<usize, McpError> {
        self.client.initialize().await?;
        self.refresh().await
    }

    /// Re-fetch the tool list of an initialized session.
    pub async fn refresh(&self) -> Result<usize, McpError> {
        let tools = self.client.list_tools().await?;
        let count = tools.len();
        tracing::info!(
            count,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Device tools discovered"
        );
        *self.specs.write().unwrap_or_else(PoisonError::into_inner) = tools;
        Ok(count)
    }

    #[must_use]
    pub const fn client(&self) -> &McpClient {
        &self.client
    }
}

#[async_trait]
impl ToolExecutor for DeviceTools {
    fn specs(&self) -> Vec<ToolSpec> {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<ToolOutput, ProviderError> {
        if !self.handles(name) {
            return Err(ProviderError::UnknownTool(name.to_string()));
        }
        tracing::debug!(tool = name, "Calling device tool");
        Ok(self.client.call_tool(name, arguments).await?)
    }
}
