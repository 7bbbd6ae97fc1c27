//! Failover chain
//!
//! Ordered list of providers attempted sequentially for one logical call.
//! The first success wins; when every provider fails, the last error is
//! returned rather than a composite. Once a stream has begun delivering
//! chunks from one provider, the chain never switches to the next — that
//! would interleave content from two models.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::chat::{ChatRequest, ChatResponse, StreamChunk};
use crate::providers::{ChunkCallback, Provider};
use crate::utils::error::{ProviderError, ProviderResult};

pub struct FailoverProvider {
    providers: Vec<Arc<dyn Provider>>,
    name: String,
}

impl FailoverProvider {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        let name = format!("failover({})", names.join("->"));

        Self { providers, name }
    }
}

#[async_trait]
impl Provider for FailoverProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let mut last_err: Option<ProviderError> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            info!(
                provider = provider.name(),
                fallback_index = index,
                "Attempting provider"
            );

            match provider.chat(request).await {
                Ok(response) => {
                    if index > 0 {
                        info!(
                            provider = provider.name(),
                            fallback_chain = %self.name,
                            "Fallback succeeded"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if err.is_cancellation() {
                        return Err(err);
                    }

                    warn!(
                        provider = provider.name(),
                        fallback_index = index,
                        error = %err,
                        "Provider failed, trying next fallback"
                    );
                    last_err = Some(err);
                }
            }
        }

        error!(fallback_chain = %self.name, "All fallback providers failed");

        Err(last_err.unwrap_or_else(|| ProviderError::internal("failover chain is empty")))
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()> {
        let mut last_err: Option<ProviderError> = None;

        for (index, provider) in self.providers.iter().enumerate() {
            info!(
                provider = provider.name(),
                fallback_index = index,
                "Attempting streaming provider"
            );

            let mut delivered = false;
            let result = {
                let mut forward = |chunk: &StreamChunk| {
                    delivered = true;
                    (on_chunk)(chunk)
                };
                provider.chat_stream(request, &mut forward).await
            };

            match result {
                Ok(()) => {
                    if index > 0 {
                        info!(
                            provider = provider.name(),
                            fallback_chain = %self.name,
                            "Streaming fallback succeeded"
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    if delivered || err.is_cancellation() {
                        // Committed stream or cancelled caller: surface the
                        // error instead of switching providers.
                        return Err(err);
                    }

                    warn!(
                        provider = provider.name(),
                        fallback_index = index,
                        error = %err,
                        "Streaming provider failed, trying next fallback"
                    );
                    last_err = Some(err);
                }
            }
        }

        error!(fallback_chain = %self.name, "All streaming fallback providers failed");

        Err(last_err.unwrap_or_else(|| ProviderError::internal("failover chain is empty")))
    }
}
