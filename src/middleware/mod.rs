//! Middleware module
//!
//! Rate limiting and request logging applied around the handlers.

pub mod logging;
pub mod rate_limit;

pub use rate_limit::{extract_api_key, RateLimitConfig, RateLimiter};
