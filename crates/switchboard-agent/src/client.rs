// ABOUTME: Factory functions for creating LLM clients from provider names and agent llm_config.
// ABOUTME: Resolves provider + optional model into a configured (Arc<dyn LlmClient>, model) pair.

use std::env;
use std::sync::Arc;

use switchboard_core::LlmConfig;

use crate::llm::{AnthropicClient, LlmClient, OpenAiClient, anthropic, openai};

/// Read an environment variable, treating an empty value as unset.
fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Settings for one provider, read from `{PREFIX}_API_KEY`, `{PREFIX}_MODEL`
/// and `{PREFIX}_BASE_URL`.
struct ProviderEnv {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl ProviderEnv {
    fn load(prefix: &str, model: Option<&str>, default_model: &str) -> Result<Self, anyhow::Error> {
        let key_var = format!("{prefix}_API_KEY");
        let api_key = non_empty_env(&key_var)
            .ok_or_else(|| anyhow::anyhow!("{key_var} environment variable not set"))?;
        let model = model
            .map(String::from)
            .or_else(|| non_empty_env(&format!("{prefix}_MODEL")))
            .unwrap_or_else(|| default_model.to_string());
        Ok(Self {
            api_key,
            model,
            base_url: non_empty_env(&format!("{prefix}_BASE_URL")),
        })
    }
}

/// Create an LLM client for a provider name.
///
/// The model is the explicit `model`, else the provider's `*_MODEL`
/// variable, else the adapter's default.
pub fn create_llm_client(
    provider: &str,
    model: Option<&str>,
) -> Result<(Arc<dyn LlmClient>, String), anyhow::Error> {
    let client: (Arc<dyn LlmClient>, String) = match provider {
        "anthropic" => {
            let settings = ProviderEnv::load("ANTHROPIC", model, anthropic::DEFAULT_MODEL)?;
            let mut client = AnthropicClient::new(settings.api_key);
            if let Some(base_url) = settings.base_url {
                client = client.with_base_url(base_url);
            }
            (Arc::new(client), settings.model)
        }
        "openai" => {
            let settings = ProviderEnv::load("OPENAI", model, openai::DEFAULT_MODEL)?;
            let mut client = OpenAiClient::new(settings.api_key);
            if let Some(base_url) = settings.base_url {
                client = client.with_base_url(base_url);
            }
            (Arc::new(client), settings.model)
        }
        unknown => anyhow::bail!("unsupported LLM provider: {unknown}"),
    };
    tracing::debug!(provider, model = %client.1, "created LLM client");
    Ok(client)
}

/// Turns an agent's `llm_config` into a client.
pub trait LlmFactory: Send + Sync {
    fn create(&self, config: &LlmConfig) -> Result<(Arc<dyn LlmClient>, String), anyhow::Error>;
}

/// Creates provider clients from environment configuration. Agents that do
/// not name a provider get the factory default.
#[derive(Debug, Clone)]
pub struct DefaultLlmFactory {
    default_provider: String,
    default_model: Option<String>,
}

impl DefaultLlmFactory {
    pub fn new(default_provider: impl Into<String>, default_model: Option<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            default_model,
        }
    }
}

impl LlmFactory for DefaultLlmFactory {
    fn create(&self, config: &LlmConfig) -> Result<(Arc<dyn LlmClient>, String), anyhow::Error> {
        let provider = config
            .provider
            .as_deref()
            .unwrap_or(&self.default_provider);
        // A default model only makes sense for the default provider.
        let model = config.model_name.as_deref().or_else(|| {
            if provider == self.default_provider {
                self.default_model.as_deref()
            } else {
                None
            }
        });
        create_llm_client(provider, model)
    }
}
