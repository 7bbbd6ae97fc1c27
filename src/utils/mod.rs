//! Shared utilities
//!
//! Error taxonomy and the per-request cancellation/idle-timeout plumbing.

pub mod context;
pub mod error;

pub use context::{IdleTracker, RequestContext};
pub use error::{ProviderError, ProviderResult};
