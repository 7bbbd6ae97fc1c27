//! Unified LLM chat gateway library
//!
//! Fronts many third-party LLM chat APIs behind one chat-completions
//! endpoint, with failover, retries, circuit breaking and per-credential
//! rate limiting between the HTTP handler and the upstream clients.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod resilience;
pub mod utils;

// Re-export common types
pub use config::Settings;
pub use handlers::{create_router, create_router_with_registry, AppState};
pub use middleware::{RateLimitConfig, RateLimiter};
pub use models::chat::{ChatRequest, ChatResponse, Message, Role, StreamChunk};
pub use providers::{Provider, ProviderRegistry};
pub use utils::{ProviderError, ProviderResult, RequestContext};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
