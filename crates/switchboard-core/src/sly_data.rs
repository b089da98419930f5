// ABOUTME: Shared private side-channel data ("sly data") and its allow-list redactor.
// ABOUTME: Sly data never enters the chat stream and is filtered at every agent boundary.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::spec::{AgentSpec, lookup_dotted};

/// Plain sly-data mapping.
pub type SlyMap = Map<String, Value>;

/// Default policy key consulted when data flows into a downstream agent.
pub const DOWNSTREAM_ALLOW_KEY: &str = "allow.sly_data";
/// Policy key consulted for data returned to the caller of a network.
pub const TO_UPSTREAM_ALLOW_KEY: &str = "allow.to_upstream.sly_data";
/// Policy key consulted for data an external agent hands back.
pub const FROM_DOWNSTREAM_ALLOW_KEY: &str = "allow.from_downstream.sly_data";

/// Handle to the sly data of one conversation. Clones share the same
/// backing map, so updates are visible to every tool in the conversation.
#[derive(Debug, Clone, Default)]
pub struct SlyData {
    inner: Arc<RwLock<SlyMap>>,
}

impl SlyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: SlyMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> SlyMap {
        self.inner.read().await.clone()
    }

    /// Merge `other` into the shared map in place.
    pub async fn update(&self, other: SlyMap) {
        let mut map = self.inner.write().await;
        for (k, v) in other {
            map.insert(k, v);
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.insert(key.into(), value);
    }

    /// True when both handles point at the same backing map.
    pub fn shares_with(&self, other: &SlyData) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Filters sly data against an agent's allow-list before it crosses an
/// agent boundary. Absence of a policy means nothing passes.
#[derive(Debug, Clone)]
pub struct SlyDataRedactor {
    config_key: String,
}

impl Default for SlyDataRedactor {
    fn default() -> Self {
        Self::new(DOWNSTREAM_ALLOW_KEY)
    }
}

impl SlyDataRedactor {
    /// Create a redactor that reads its policy from the given dotted key.
    pub fn new(config_key: impl Into<String>) -> Self {
        Self {
            config_key: config_key.into(),
        }
    }

    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    /// Redact using an agent spec as the basis config.
    pub fn filter_spec(&self, spec: Option<&AgentSpec>, sly_data: &SlyMap) -> SlyMap {
        self.filter_config(spec.map(AgentSpec::raw), sly_data)
    }

    /// Redact using a raw basis config.
    ///
    /// The policy value may be `true` (everything passes), `false` or absent
    /// (nothing passes), or a mapping of `source_key -> destination` where the
    /// destination is `true` to keep the key name or a string to rename it.
    pub fn filter_config(&self, basis_config: Option<&Value>, sly_data: &SlyMap) -> SlyMap {
        let Some(basis) = basis_config.filter(|b| b.is_object()) else {
            return SlyMap::new();
        };

        match lookup_dotted(basis, &self.config_key) {
            Some(Value::Bool(true)) => sly_data.clone(),
            Some(Value::Object(policy)) => {
                let mut redacted = SlyMap::new();
                for (source_key, destination) in policy {
                    let Some(value) = sly_data.get(source_key) else {
                        continue;
                    };
                    if value.is_null() {
                        continue;
                    }
                    match destination {
                        Value::Bool(true) => {
                            redacted.insert(source_key.clone(), value.clone());
                        }
                        Value::String(dest) if !dest.is_empty() => {
                            redacted.insert(dest.clone(), value.clone());
                        }
                        _ => {}
                    }
                }
                redacted
            }
            _ => SlyMap::new(),
        }
    }
}
