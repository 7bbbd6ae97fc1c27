//! Provider registry
//!
//! Parses qualified model strings (`provider/model[|provider/model...]`),
//! builds the breaker -> retry -> failover composition around the concrete
//! clients and memoizes composed providers for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::providers::catalog;
use crate::providers::compat::{CompatConfig, OpenAICompatProvider};
use crate::providers::Provider;
use crate::resilience::{BreakerConfig, BreakerRegistry, BreakerState, RetryConfig, RetryProvider};
use crate::resilience::FailoverProvider;
use crate::utils::error::{ProviderError, ProviderResult};

/// Split a qualified model string into its fallback pieces, left to right.
pub fn split_fallbacks(qualified: &str) -> Vec<&str> {
    qualified.split('|').collect()
}

/// Split one `provider/model` piece. The model part may itself contain
/// slashes (e.g. `together/meta-llama/Llama-3.3-70B`).
pub fn parse_piece(piece: &str) -> ProviderResult<(&str, &str)> {
    piece.split_once('/').ok_or_else(|| {
        ProviderError::validation(
            format!("model must be in provider/model format, got {piece:?}"),
            "invalid_model_format",
        )
    })
}

/// Process-wide registry of composed providers.
///
/// Composed providers are keyed by `(provider, endpoint, retry-enabled)` and
/// constructed lazily with the read-lock / write-lock / re-check discipline,
/// so concurrent resolvers of the same key build it exactly once.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    /// Pre-built base providers taking precedence over the static catalog
    /// (used by tests and embedders to plug in their own clients).
    custom: RwLock<HashMap<String, Arc<dyn Provider>>>,
    breakers: BreakerRegistry,
    retry_config: RetryConfig,
    retry_with_fallback: bool,
}

impl ProviderRegistry {
    pub fn new(retry_with_fallback: bool) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            custom: RwLock::new(HashMap::new()),
            breakers: BreakerRegistry::new(BreakerConfig::default()),
            retry_config: RetryConfig::default(),
            retry_with_fallback,
        }
    }

    /// Override the retry settings applied when composing providers.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Register a base provider under a name, shadowing the catalog.
    ///
    /// The provider is still wrapped in the resilience chain on resolve.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.custom.write().unwrap().insert(name.into(), provider);
    }

    /// Resolve a qualified model string into a ready-to-call provider plus
    /// the bare model name (the primary piece's model part).
    pub fn resolve(
        &self,
        qualified: &str,
        endpoint: Option<&str>,
    ) -> ProviderResult<(Arc<dyn Provider>, String)> {
        let pieces = split_fallbacks(qualified);

        if pieces.len() == 1 {
            let (provider_name, model) = parse_piece(pieces[0])?;
            let provider = self.get_or_create(provider_name, endpoint, true)?;
            return Ok((provider, model.to_string()));
        }

        let enable_retries = self.retry_with_fallback;
        let mut chain: Vec<Arc<dyn Provider>> = Vec::with_capacity(pieces.len());
        let mut final_model = String::new();

        for (index, piece) in pieces.iter().enumerate() {
            let (provider_name, model) = parse_piece(piece)?;

            if index == 0 {
                final_model = model.to_string();
            }

            match self.get_or_create(provider_name, endpoint, enable_retries) {
                Ok(provider) => chain.push(provider),
                Err(err) => {
                    warn!(
                        model_spec = piece,
                        error = %err,
                        "Failed to create provider for fallback"
                    );
                }
            }
        }

        if chain.is_empty() {
            return Err(ProviderError::validation(
                "no valid fallback providers available",
                "no_providers",
            ));
        }

        let failover: Arc<dyn Provider> = Arc::new(FailoverProvider::new(chain));
        Ok((failover, final_model))
    }

    /// Current breaker state for a provider, if one has been constructed.
    pub fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        self.breakers.state(name)
    }

    fn get_or_create(
        &self,
        name: &str,
        endpoint: Option<&str>,
        enable_retry: bool,
    ) -> ProviderResult<Arc<dyn Provider>> {
        let cache_key = format!("{}:{}:{}", name, endpoint.unwrap_or(""), enable_retry);

        {
            let providers = self.providers.read().unwrap();
            if let Some(provider) = providers.get(&cache_key) {
                return Ok(Arc::clone(provider));
            }
        }

        let mut providers = self.providers.write().unwrap();
        // Another task may have built it between the two locks.
        if let Some(provider) = providers.get(&cache_key) {
            return Ok(Arc::clone(provider));
        }

        let base = self.construct_base(name, endpoint)?;
        let mut wrapped = self.breakers.wrap(base);

        if enable_retry {
            wrapped = Arc::new(RetryProvider::new(wrapped, self.retry_config.clone()));
        }

        providers.insert(cache_key, Arc::clone(&wrapped));

        Ok(wrapped)
    }

    fn construct_base(&self, name: &str, endpoint: Option<&str>) -> ProviderResult<Arc<dyn Provider>> {
        {
            let custom = self.custom.read().unwrap();
            if let Some(provider) = custom.get(name) {
                return Ok(Arc::clone(provider));
            }
        }

        let vendor = catalog::find_vendor(name).ok_or_else(|| {
            ProviderError::validation(format!("unknown provider: {name:?}"), "unknown_provider")
        })?;

        let endpoint = endpoint.unwrap_or("");
        if vendor.requires_endpoint && endpoint.is_empty() {
            return Err(ProviderError::validation(
                format!("{name} provider requires an endpoint to be provided"),
                "missing_endpoint",
            ));
        }

        let base_url = if vendor.requires_endpoint {
            endpoint.to_string()
        } else {
            vendor.base_url.to_string()
        };

        let api_key = vendor
            .key_env
            .and_then(|env| std::env::var(env).ok())
            .filter(|key| !key.is_empty());

        let provider = OpenAICompatProvider::new(
            vendor.name,
            CompatConfig {
                base_url,
                api_key,
                api_key_header: vendor.api_key_header.map(str::to_string),
                extra_headers: Vec::new(),
            },
        );

        Ok(Arc::new(provider))
    }
}
