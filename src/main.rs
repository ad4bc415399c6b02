// Stratum - MCP tool server for four-layer DAG planning
// Main entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use stratum::config::load_config;
use stratum::dag::PathCache;
use stratum::feedback::SessionStore;
use stratum::server::McpServer;
use stratum::tools::{default_registry, ToolContext, ToolExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load configuration
    let config = load_config()?;

    let path_cache = PathCache::default_location()
        .unwrap_or_else(|| PathCache::new(PathBuf::from(".stratum_path_cache.toml")));

    let context = ToolContext {
        path_cache: Arc::new(path_cache),
        sessions: Arc::new(SessionStore::new()),
        config: Arc::new(config),
    };

    let executor = ToolExecutor::new(default_registry());
    let server = McpServer::new(executor, context);

    server.run().await
}

/// Diagnostics go to stderr; stdout carries the MCP protocol.
fn init_tracing() {
    let debug = std::env::var("STRATUM_DEBUG")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false);
    let default_filter = if debug { "stratum=debug" } else { "stratum=info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
