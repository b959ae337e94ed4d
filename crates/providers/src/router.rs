//! Provider router — selects the LLM provider named in config.

use orgchat_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build the router from configuration.
///
/// A missing API key is not an error here; the provider rejects requests
/// with `AuthenticationFailed` instead.
pub fn build_from_config(config: &orgchat_config::AppConfig) -> ProviderRouter {
    let name = &config.provider.name;
    let mut router = ProviderRouter::new(name.clone());

    let api_key = config.provider.api_key.clone().unwrap_or_default();
    let base_url = config
        .provider
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));

    if api_key.is_empty() {
        tracing::warn!(provider = %name, "No API key configured; provider calls will fail");
    }

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::with_timeout(
        name.as_str(),
        base_url,
        api_key,
        Duration::from_secs(config.provider.timeout_secs),
    ));
    router.register(name.clone(), provider);

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
