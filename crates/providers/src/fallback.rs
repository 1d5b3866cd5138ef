//! Extraction backends tried in order.
//!
//! Each [`ChainLink`] pins a provider to the model id it understands and to
//! its own time budget. A failure that another backend could plausibly
//! avoid (outage, throttling, bad key, timeout) moves on to the next link.
//! A request the backend rejected as malformed stops the chain: the same
//! prompt would be rejected everywhere.

use async_trait::async_trait;
use compagent_core::error::ProviderError;
use compagent_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Time budget for a link built without one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One backend in the chain.
pub struct ChainLink {
    provider: Arc<dyn Provider>,
    model: Option<String>,
    timeout: Duration,
}

impl ChainLink {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Send this model id instead of the request's.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn attempt(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut request = request.clone();
        if let Some(model) = &self.model {
            request.model = model.clone();
        }
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "{} gave no answer within {}s",
                self.provider.name(),
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Whether a failure is worth retrying on a different backend.
pub fn worth_next_link(error: &ProviderError) -> bool {
    match error {
        ProviderError::ApiError { status_code, .. } => {
            matches!(status_code, 401 | 403 | 404 | 408 | 409 | 429) || *status_code >= 500
        }
        ProviderError::RateLimited { .. }
        | ProviderError::AuthenticationFailed(_)
        | ProviderError::NotConfigured(_)
        | ProviderError::Timeout(_)
        | ProviderError::Network(_) => true,
    }
}

/// The provider the extractor talks to.
pub struct FallbackProvider {
    name: String,
    links: Vec<ChainLink>,
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
        }
    }

    pub fn link(mut self, link: ChainLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Backend names, in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.provider.name()).collect()
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut failures = Vec::new();

        for (position, link) in self.links.iter().enumerate() {
            let backend = link.provider.name();
            match link.attempt(&request).await {
                Ok(response) => {
                    if position > 0 {
                        debug!(backend, position, "Extraction answered by a fallback backend");
                    }
                    return Ok(response);
                }
                Err(e) if worth_next_link(&e) => {
                    warn!(backend, error = %e, "Extraction backend failed, trying the next one");
                    failures.push(e);
                }
                Err(e) => {
                    warn!(backend, error = %e, "Extraction request rejected, not retrying");
                    return Err(e);
                }
            }
        }

        Err(failures.pop().unwrap_or_else(|| {
            ProviderError::NotConfigured("no extraction backend is configured".into())
        }))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        for link in &self.links {
            if let Ok(true) = link.provider.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
