//! Configuration management module
//!
//! Environment-sourced settings for the server, rate limiter and request
//! handling.

pub mod settings;

pub use settings::Settings;
