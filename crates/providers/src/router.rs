//! Provider router: builds providers from config and assembles the
//! fallback chain the assistant talks to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use compagent_config::AppConfig;
use compagent_core::provider::Provider;

use crate::fallback::{ChainLink, FallbackProvider};
use crate::openai_compat::{GEMINI_BASE_URL, OPENAI_BASE_URL, OpenAiCompatProvider};

/// Named providers plus the default's name.
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

/// Build every provider the config mentions: the default, the fallback
/// chain, and anything under `[providers]`.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.push(&config.default_provider);
    names.extend(config.fallback.iter());

    for name in names {
        if router.get(name).is_some() {
            continue;
        }
        let provider_config = config.providers.get(name);

        let api_key = provider_config
            .and_then(|p| p.api_key.clone())
            .or_else(|| env_api_key(name))
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
    }

    router
}

/// The provider the assistant uses: default first, then `config.fallback`
/// in order, each bounded by `agent.llm_timeout_secs` and pinned to its own
/// model.
pub fn build_chain(config: &AppConfig) -> Arc<dyn Provider> {
    let router = build_from_config(config);
    let timeout = Duration::from_secs(config.agent.llm_timeout_secs);

    let mut order = vec![config.default_provider.clone()];
    for name in &config.fallback {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }

    let mut chain = FallbackProvider::new("chain");
    for name in order {
        let Some(provider) = router.get(&name) else {
            continue;
        };
        let model = model_for(config, &name);
        chain = chain.link(ChainLink::new(provider).model(model).timeout(timeout));
    }

    tracing::debug!(providers = ?chain.provider_names(), "Built provider chain");
    Arc::new(chain)
}

/// Model id for a provider: its own `default_model`, the global default for
/// the default provider, else a well-known default.
fn model_for(config: &AppConfig, name: &str) -> String {
    if let Some(model) = config
        .providers
        .get(name)
        .and_then(|p| p.default_model.clone())
    {
        return model;
    }
    if name == config.default_provider {
        return config.default_model.clone();
    }
    match name {
        "gemini" => "gemini-1.5-pro".into(),
        "openai" => "gpt-4o".into(),
        _ => config.default_model.clone(),
    }
}

/// Provider-specific key variables, e.g. `GEMINI_API_KEY`.
fn env_api_key(provider_name: &str) -> Option<String> {
    let var = format!("{}_API_KEY", provider_name.to_ascii_uppercase());
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => OPENAI_BASE_URL.into(),
        "gemini" => GEMINI_BASE_URL.into(),
        "azure" => "https://api.openai.azure.com/openai/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compagent_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatProvider::openai("sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("gemini").contains("googleapis.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config_registers_fallback() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        assert!(router.default().is_some());
        assert!(router.get("gemini").is_some());
        assert_eq!(router.list().len(), 2);
    }

    #[test]
    fn chain_uses_per_provider_models() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "gemini".into(),
            ProviderConfig {
                api_key: Some("g-key".into()),
                api_url: None,
                default_model: Some("gemini-2.0-flash".into()),
            },
        );
        assert_eq!(model_for(&config, "openai"), "gpt-4o");
        assert_eq!(model_for(&config, "gemini"), "gemini-2.0-flash");

        let chain = build_chain(&config);
        assert_eq!(chain.name(), "chain");
    }

    #[test]
    fn duplicate_fallback_entries_are_ignored() {
        let mut config = AppConfig::default();
        config.fallback = vec!["openai".into(), "gemini".into(), "gemini".into()];
        let router = build_from_config(&config);
        assert_eq!(router.list().len(), 2);
    }
}
