//! Resilience chain
//!
//! Wrappers that implement the provider capability set around another
//! provider: failover -> retry -> circuit breaker -> concrete client.

pub mod breaker;
pub mod failover;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker};
pub use failover::FailoverProvider;
pub use retry::{RetryConfig, RetryProvider};
