//! Tool routing and the agent's internal tools.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use voxhub_core::{ProviderError, ToolExecutor, ToolOutput, ToolSpec};

pub const EXIT_INTENT_TOOL: &str = "exit_intent";

/// Lets the model end the conversation.
///
/// Calling the tool only raises a flag; the session closes the connection
/// once the current turn has been spoken.
#[derive(Debug, Default)]
pub struct ExitIntent {
    requested: AtomicBool,
}

impl ExitIntent {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Read and clear the flag.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

#[async_trait]
impl ToolExecutor for ExitIntent {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec::without_arguments(
            EXIT_INTENT_TOOL,
            "Use this when user want to stop the conversation",
        )]
    }

    async fn call(&self, name: &str, _arguments: Value) -> Result<ToolOutput, ProviderError> {
        if name != EXIT_INTENT_TOOL {
            return Err(ProviderError::UnknownTool(name.to_string()));
        }
        tracing::info!("Model requested end of conversation");
        self.requested.store(true, Ordering::Release);
        Ok(ToolOutput::ok("Goodbye"))
    }

    fn handles(&self, name: &str) -> bool {
        name == EXIT_INTENT_TOOL
    }
}

/// Several executors presented as one. Earlier executors win name clashes.
#[derive(Clone, Default)]
pub struct Toolbox {
    executors: Vec<Arc<dyn ToolExecutor>>,
}

impl Toolbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn push(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.executors.push(executor);
    }
}

#[async_trait]
impl ToolExecutor for Toolbox {
    fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = Vec::new();
        for spec in self.executors.iter().flat_map(|e| e.specs()) {
            if !specs.iter().any(|s| s.name == spec.name) {
                specs.push(spec);
            }
        }
        specs
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<ToolOutput, ProviderError> {
        match self.executors.iter().find(|e| e.handles(name)) {
            Some(executor) => executor.call(name, arguments).await,
            None => Err(ProviderError::UnknownTool(name.to_string())),
        }
    }

    fn handles(&self, name: &str) -> bool {
        self.executors.iter().any(|e| e.handles(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        fn specs(&self) -> Vec<ToolSpec> {
            vec![
                ToolSpec::without_arguments("echo", "Echo the arguments"),
                ToolSpec::without_arguments(EXIT_INTENT_TOOL, "shadowed"),
            ]
        }

        async fn call(&self, _name: &str, arguments: Value) -> Result<ToolOutput, ProviderError> {
            Ok(ToolOutput::ok(arguments.to_string()))
        }
    }

    #[tokio::test]
    async fn exit_intent_raises_flag_once() {
        let exit = ExitIntent::new();
        assert!(!exit.is_requested());
        exit.call(EXIT_INTENT_TOOL, Value::Null).await.unwrap();
        assert!(exit.take());
        assert!(!exit.take());
    }

    #[tokio::test]
    async fn toolbox_routes_and_dedupes() {
        let exit = ExitIntent::new();
        let toolbox = Toolbox::new().with(exit.clone()).with(Arc::new(Echo));

        let names: Vec<_> = toolbox.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec![EXIT_INTENT_TOOL, "echo"]);

        let out = toolbox.call("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(out.content, r#"{"a":1}"#);

        toolbox.call(EXIT_INTENT_TOOL, json!({})).await.unwrap();
        assert!(exit.is_requested());

        assert!(matches!(
            toolbox.call("missing", json!({})).await,
            Err(ProviderError::UnknownTool(_))
        ));
    }
}
