// ABOUTME: Configuration loading and validation for the switchboard server.
// ABOUTME: Reads SWITCHBOARD_* environment variables with defaults for local use.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SWITCHBOARD_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("SWITCHBOARD_SESSION_TTL_SECS must be a positive number of seconds: {0}")]
    InvalidTtl(String),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub manifest: PathBuf,
    pub agent_tool_path: Option<String>,
    pub default_provider: String,
    pub default_model: Option<String>,
    pub session_ttl: Duration,
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - SWITCHBOARD_BIND: socket address (default: 127.0.0.1:8080)
    /// - SWITCHBOARD_MANIFEST: manifest of networks to serve (default: registries/manifest.json)
    /// - AGENT_TOOL_PATH: coded-tool prefix (optional)
    /// - SWITCHBOARD_DEFAULT_PROVIDER: LLM provider (default: anthropic)
    /// - SWITCHBOARD_DEFAULT_MODEL: LLM model name (optional)
    /// - SWITCHBOARD_SESSION_TTL_SECS: idle polling sessions are dropped after this (default: 3600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_str = non_empty("SWITCHBOARD_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let manifest = non_empty("SWITCHBOARD_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("registries/manifest.json"));

        let session_ttl = match non_empty("SWITCHBOARD_SESSION_TTL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTtl(raw)),
            },
            None => Duration::from_secs(3600),
        };

        Ok(Self {
            bind,
            manifest,
            agent_tool_path: non_empty("AGENT_TOOL_PATH"),
            default_provider: non_empty("SWITCHBOARD_DEFAULT_PROVIDER")
                .unwrap_or_else(|| "anthropic".to_string()),
            default_model: non_empty("SWITCHBOARD_DEFAULT_MODEL"),
            session_ttl,
        })
    }
}
