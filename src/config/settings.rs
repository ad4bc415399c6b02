// Configuration structs

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 9004;
pub const DEFAULT_WEB_PORT: u16 = 9005;

/// Server configuration. Defaults are usable out of the box; a config file
/// and environment variables can override each field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host for network surfaces.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port reserved for network transports (stdio needs none).
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Port handed to feedback-collecting surfaces.
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Verbose diagnostics on stderr.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            web_port: DEFAULT_WEB_PORT,
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn web_url(&self) -> String {
        format!("http://{}:{}", self.host, self.web_port)
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.server_port)
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}
