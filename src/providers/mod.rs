//! Provider module
//!
//! Defines the provider capability set and everything needed to build one:
//! the openai-compatible upstream client, SSE decoding, the static vendor
//! catalog and the registry that parses qualified model strings and composes
//! the resilience chain.

pub mod catalog;
pub mod compat;
pub mod registry;
pub mod sse;

use async_trait::async_trait;

use crate::models::chat::{ChatRequest, ChatResponse, StreamChunk};
use crate::utils::error::ProviderResult;

/// Callback invoked serially, in arrival order, for every stream chunk.
///
/// A non-`Ok` return halts the stream and is propagated verbatim.
pub type ChunkCallback<'a> = &'a mut (dyn FnMut(&StreamChunk) -> ProviderResult<()> + Send);

/// The provider capability set.
///
/// Concrete upstream clients and the resilience wrappers (circuit breaker,
/// retry, failover) all implement this trait, which is what makes the
/// composition in the registry possible.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, used for logging and breaker identity.
    fn name(&self) -> &str;

    /// Send one chat completion request and await the full response.
    ///
    /// Every failure mode, including IO and protocol errors, is reported as
    /// a `ProviderError` with a populated status code. The cancellation
    /// signal in `request.context` is observed at every suspension point.
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    /// Stream a chat completion, invoking `on_chunk` for each parsed chunk.
    ///
    /// Returns `Ok(())` on clean upstream termination. Implementations never
    /// invoke `on_chunk` concurrently.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

pub use compat::{CompatConfig, OpenAICompatProvider};
pub use registry::ProviderRegistry;
