// Server configuration

pub mod loader;
pub mod settings;

pub use loader::load_config;
pub use settings::{ServerConfig, DEFAULT_HOST, DEFAULT_SERVER_PORT, DEFAULT_WEB_PORT};
