// Configuration loader
//
// Reads ~/.stratum/config.toml when present, then applies environment
// variable overrides (STRATUM_HOST, STRATUM_SERVER_PORT, STRATUM_WEB_PORT,
// STRATUM_DEBUG). Malformed values fall back to defaults rather than
// aborting startup.

use anyhow::{Context, Result};
use std::fs;
use tracing::warn;

use super::settings::ServerConfig;

pub fn load_config() -> Result<ServerConfig> {
    let mut config = try_load_from_file()?.unwrap_or_default();
    apply_env_overrides(&mut config);
    Ok(config)
}

fn try_load_from_file() -> Result<Option<ServerConfig>> {
    let Some(home) = dirs::home_dir() else {
        return Ok(None);
    };
    let config_path = home.join(".stratum").join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    match toml::from_str(&contents) {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            warn!("ignoring malformed config at {}: {e}", config_path.display());
            Ok(None)
        }
    }
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(host) = std::env::var("STRATUM_HOST") {
        if !host.is_empty() {
            config.host = host;
        }
    }
    if let Some(port) = env_port("STRATUM_SERVER_PORT") {
        config.server_port = port;
    }
    if let Some(port) = env_port("STRATUM_WEB_PORT") {
        config.web_port = port;
    }
    if let Ok(debug) = std::env::var("STRATUM_DEBUG") {
        config.debug = parse_bool(&debug);
    }
}

pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Ports below the unprivileged range are rejected; 0 is allowed to mean
/// "pick one". Invalid values are ignored with a warning.
fn env_port(var: &str) -> Option<u16> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u16>() {
        Ok(port) if port >= 1024 => Some(port),
        Ok(0) => Some(0),
        _ => {
            warn!("ignoring invalid {var}={raw}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepted_forms() {
        for value in ["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert!(parse_bool(value), "{value} should parse as true");
        }
        for value in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!parse_bool(value), "{value} should parse as false");
        }
    }

    #[test]
    fn test_env_port_validation() {
        std::env::set_var("STRATUM_TEST_PORT_OK", "9100");
        assert_eq!(env_port("STRATUM_TEST_PORT_OK"), Some(9100));

        std::env::set_var("STRATUM_TEST_PORT_ZERO", "0");
        assert_eq!(env_port("STRATUM_TEST_PORT_ZERO"), Some(0));

        std::env::set_var("STRATUM_TEST_PORT_LOW", "80");
        assert_eq!(env_port("STRATUM_TEST_PORT_LOW"), None);

        std::env::set_var("STRATUM_TEST_PORT_BAD", "not-a-port");
        assert_eq!(env_port("STRATUM_TEST_PORT_BAD"), None);

        assert_eq!(env_port("STRATUM_TEST_PORT_UNSET"), None);
    }
}
