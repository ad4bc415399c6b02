// Tool dispatch layer for the MCP server
//
// Tools implement the Tool trait, register in the ToolRegistry, and run
// through the ToolExecutor, which maps failures to error results.

pub mod executor;
pub mod implementations;
pub mod registry;
pub mod types;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use types::{ContentBlock, ToolContext, ToolDefinition, ToolInputSchema, ToolOutput};

use crate::dag::LayerType;

/// Build the registry with every tool this server exposes.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for layer in LayerType::ALL {
        registry.register(Box::new(implementations::LayerBuildTool::new(layer)));
    }
    registry.register(Box::new(implementations::GetSavedDagsTool));
    registry.register(Box::new(implementations::IterateDagTool));
    registry.register(Box::new(implementations::InteractiveFeedbackTool));
    registry.register(Box::new(implementations::GetSystemInfoTool));
    registry
}
