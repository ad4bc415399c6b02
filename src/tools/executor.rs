// Tool execution engine
//
// Resolves tool names against the registry and maps execution failures to
// error results instead of protocol faults, so a failing tool never takes
// the session down.

use serde_json::Value;
use tracing::{error, info, instrument};

use super::registry::ToolRegistry;
use super::types::{ToolContext, ToolOutput};

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    #[instrument(skip(self, input, context), fields(tool = %name))]
    pub async fn execute_tool(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> ToolOutput {
        info!("Executing tool: {}", name);

        let Some(tool) = self.registry.get(name) else {
            error!("Tool not found: {}", name);
            return ToolOutput::error(format!("Tool '{name}' not found"));
        };

        match tool.execute(input, context).await {
            Ok(output) => output,
            Err(e) => {
                error!("Tool execution failed: {e:#}");
                ToolOutput::error(format!("Execution error: {e:#}"))
            }
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::dag::PathCache;
    use crate::feedback::SessionStore;
    use crate::tools::registry::Tool;
    use crate::tools::types::ToolInputSchema;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct MockTool {
        should_fail: bool,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn description(&self) -> &str {
            "A mock tool"
        }

        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::simple(vec![("param", "Test parameter")])
        }

        async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput> {
            if self.should_fail {
                anyhow::bail!("Mock failure");
            }
            Ok(ToolOutput::text(format!("Mock result: {}", input)))
        }
    }

    fn test_context(dir: &TempDir) -> ToolContext {
        ToolContext {
            path_cache: Arc::new(PathCache::new(dir.path().join("cache.toml"))),
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(ServerConfig::default()),
        }
    }

    fn create_test_executor(tool_should_fail: bool) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockTool {
            should_fail: tool_should_fail,
        }));
        ToolExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_execute_tool_success() {
        let dir = TempDir::new().unwrap();
        let executor = create_test_executor(false);

        let result = executor
            .execute_tool("mock", serde_json::json!({"param": "value"}), &test_context(&dir))
            .await;

        assert!(!result.is_error);
        assert!(result.content[0].as_text().unwrap().contains("Mock result"));
    }

    #[tokio::test]
    async fn test_execute_tool_not_found() {
        let dir = TempDir::new().unwrap();
        let executor = create_test_executor(false);

        let result = executor
            .execute_tool("nonexistent", serde_json::json!({}), &test_context(&dir))
            .await;

        assert!(result.is_error);
        assert!(result.content[0].as_text().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_execute_tool_execution_failure() {
        let dir = TempDir::new().unwrap();
        let executor = create_test_executor(true);

        let result = executor
            .execute_tool("mock", serde_json::json!({"param": "value"}), &test_context(&dir))
            .await;

        assert!(result.is_error);
        assert!(result.content[0]
            .as_text()
            .unwrap()
            .contains("Execution error"));
    }
}
