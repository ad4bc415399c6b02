// System info tool
//
// Reports platform, environment detection (SSH remote, container, WSL),
// server version, and the active configuration.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;

use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolInputSchema, ToolOutput};

const SSH_ENV_VARS: &[&str] = &["SSH_CONNECTION", "SSH_CLIENT", "SSH_TTY"];
const REMOTE_ENV_VARS: &[&str] = &["REMOTE_CONTAINERS", "CODESPACES"];

pub struct GetSystemInfoTool;

#[async_trait]
impl Tool for GetSystemInfoTool {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "Report the server's platform, environment (local, SSH remote, container, WSL), \
         version, and active configuration."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::simple(vec![])
    }

    async fn execute(&self, _input: Value, context: &ToolContext) -> Result<ToolOutput> {
        let remote = is_remote_environment();
        let wsl = is_wsl_environment();
        let kind = if wsl {
            "wsl"
        } else if remote {
            "remote"
        } else {
            "local"
        };

        let result = json!({
            "success": true,
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": env!("CARGO_PKG_VERSION"),
            "environment": {
                "kind": kind,
                "remote": remote,
                "wsl": wsl,
            },
            "config": {
                "host": context.config.host,
                "server_port": context.config.server_port,
                "web_port": context.config.web_port,
                "debug": context.config.debug,
            },
        });

        Ok(ToolOutput::text(serde_json::to_string_pretty(&result)?))
    }
}

fn is_remote_environment() -> bool {
    SSH_ENV_VARS
        .iter()
        .chain(REMOTE_ENV_VARS)
        .any(|var| std::env::var_os(var).is_some())
}

fn is_wsl_environment() -> bool {
    if std::env::var_os("WSL_DISTRO_NAME").is_some() {
        return true;
    }
    fs::read_to_string("/proc/version")
        .map(|version| version.to_ascii_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::dag::PathCache;
    use crate::feedback::SessionStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reports_platform_and_config() {
        let dir = TempDir::new().unwrap();
        let context = ToolContext {
            path_cache: Arc::new(PathCache::new(dir.path().join("cache.toml"))),
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(ServerConfig::default()),
        };

        let output = GetSystemInfoTool
            .execute(json!({}), &context)
            .await
            .unwrap();
        let result: Value =
            serde_json::from_str(output.content[0].as_text().unwrap()).unwrap();

        assert_eq!(result["success"], true);
        assert_eq!(result["platform"], std::env::consts::OS);
        assert_eq!(result["config"]["server_port"], 9004);
        assert_eq!(result["config"]["web_port"], 9005);
        assert!(result["environment"]["kind"].is_string());
    }
}
