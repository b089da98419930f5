// ABOUTME: Persistence layer for switchboard, reading agent network definitions from disk.
// ABOUTME: Provides network file parsing, the normalization filter chain, manifests, and tool-path resolution.

pub mod filters;
pub mod manifest;
pub mod network;
pub mod tool_path;

use std::path::PathBuf;

use thiserror::Error;

pub use filters::{LlmConfigFilter, NetworkFilter, ReplacementStringsFilter, normalize_network};
pub use manifest::{Manifest, load_manifest, load_manifest_networks};
pub use network::{AgentNetwork, FileFormat, load_network, parse_network};
pub use tool_path::{AGENT_TOOL_PATH_ENV, determine_agent_tool_path};

/// Errors that can occur while loading networks and manifests.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported file extension for {0}")]
    UnsupportedFormat(PathBuf),

    #[error("{0} must be a mapping")]
    NotAMapping(&'static str),

    #[error("network '{network}' has an invalid agent spec: {source}")]
    Spec {
        network: String,
        #[source]
        source: switchboard_core::SpecError,
    },
}
