// ABOUTME: Manifest files listing which agent network files a service should serve.
// ABOUTME: Only entries mapped to `true` are loaded; relative paths resolve against the manifest.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::StoreError;
use crate::network::{AgentNetwork, FileFormat, load_network};

/// The enabled network files of a manifest, resolved to paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub path: PathBuf,
    pub networks: Vec<PathBuf>,
}

impl Manifest {
    /// Directory containing the manifest.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Read a manifest without loading the networks it names.
pub fn load_manifest(path: &Path) -> Result<Manifest, StoreError> {
    let format = FileFormat::from_path(path)?;
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Object(entries) = format.parse(&text)? else {
        return Err(StoreError::NotAMapping("manifest"));
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let networks = entries
        .into_iter()
        .filter_map(|(file, enabled)| match enabled {
            Value::Bool(true) => Some(dir.join(file)),
            Value::Bool(false) => None,
            other => {
                tracing::warn!(file = %file, value = %other, "ignoring non-boolean manifest entry");
                None
            }
        })
        .collect();

    Ok(Manifest {
        path: path.to_path_buf(),
        networks,
    })
}

/// Load every enabled network listed in a manifest. A network that fails
/// to load is logged and skipped so one broken file does not take down
/// the others.
pub fn load_manifest_networks(path: &Path) -> Result<Vec<AgentNetwork>, StoreError> {
    let manifest = load_manifest(path)?;
    let mut networks = Vec::with_capacity(manifest.networks.len());
    for file in &manifest.networks {
        match load_network(file) {
            Ok(network) => networks.push(network),
            Err(err) => {
                tracing::error!(file = %file.display(), error = %err, "failed to load agent network");
            }
        }
    }
    tracing::info!(
        manifest = %path.display(),
        loaded = networks.len(),
        "loaded manifest"
    );
    Ok(networks)
}
