// ABOUTME: Agent network files: a list of agent specs plus network-wide defaults.
// ABOUTME: Parses JSON, YAML and JSON-compatible HOCON and runs the normalization chain.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use switchboard_core::AgentSpec;

use crate::StoreError;
use crate::filters::normalize_network;

/// On-disk encodings understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    /// Pick a format from a file extension. `.hocon` is read as JSON.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") | Some("hocon") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Decode text in this format into a JSON value.
    pub fn parse(self, text: &str) -> Result<Value, StoreError> {
        match self {
            Self::Json => Ok(serde_json::from_str(text)?),
            Self::Yaml => Ok(serde_yaml::from_str(text)?),
        }
    }
}

/// A validated agent network: every spec normalized, in file order.
#[derive(Debug, Clone)]
pub struct AgentNetwork {
    pub name: String,
    pub specs: Vec<AgentSpec>,
    /// Directory the network was loaded from, when it came from disk.
    pub source_dir: Option<PathBuf>,
}

/// Parse and normalize a network document.
pub fn parse_network(name: &str, text: &str, format: FileFormat) -> Result<AgentNetwork, StoreError> {
    let document = format.parse(text)?;
    let specs = normalize_network(name, document)?;
    Ok(AgentNetwork {
        name: name.to_string(),
        specs,
        source_dir: None,
    })
}

/// Load a network file; the network name is the file stem.
pub fn load_network(path: &Path) -> Result<AgentNetwork, StoreError> {
    let format = FileFormat::from_path(path)?;
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut network = parse_network(&name, &text, format)?;
    network.source_dir = path.parent().map(Path::to_path_buf);
    tracing::debug!(network = %name, agents = network.specs.len(), "loaded agent network");
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_YAML: &str = r#"
tools:
  - name: announcer
    instructions: Greet people.
    function:
      description: Front door
    tools: [greeter]
  - name: greeter
    instructions: Say hello.
    function:
      description: Says hello
      parameters:
        type: object
        properties:
          who: {type: string}
"#;

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a.hocon")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a.yml")).unwrap(), FileFormat::Yaml);
        assert!(matches!(
            FileFormat::from_path(Path::new("a.txt")),
            Err(StoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parse_yaml_network() {
        let network = parse_network("hello", HELLO_YAML, FileFormat::Yaml).unwrap();
        assert_eq!(network.specs.len(), 2);
        assert_eq!(network.specs[0].name, "announcer");
        assert_eq!(network.specs[0].tools, vec!["greeter".to_string()]);
        assert!(network.specs[1].function.as_ref().unwrap().has_parameters());
    }

    #[test]
    fn load_network_uses_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello_world.yaml");
        fs::write(&path, HELLO_YAML).unwrap();

        let network = load_network(&path).unwrap();
        assert_eq!(network.name, "hello_world");
        assert_eq!(network.source_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = load_network(Path::new("/nonexistent/net.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/net.json"));
    }
}
