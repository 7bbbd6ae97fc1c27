//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic plus the application state and
//! router wiring.

pub mod chat;
pub mod health;
pub mod models;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Settings;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::middleware::logging::request_logging_middleware;
use crate::providers::ProviderRegistry;

/// Application state shared by all handlers.
pub struct AppState {
    pub settings: Settings,
    pub registry: Arc<ProviderRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Create the application router with a freshly built provider registry.
pub async fn create_router(settings: Settings) -> Result<Router> {
    let registry = Arc::new(ProviderRegistry::new(settings.retry_with_fallback));
    create_router_with_registry(settings, registry).await
}

/// Create the application router around an existing registry (used by tests
/// and embedders that pre-register providers).
pub async fn create_router_with_registry(
    settings: Settings,
    registry: Arc<ProviderRegistry>,
) -> Result<Router> {
    let rate_limiter = RateLimiter::new(settings.rate_limit.clone());
    rate_limiter.start_sweeper();

    let app_state = Arc::new(AppState {
        settings: settings.clone(),
        registry,
        rate_limiter,
    });

    let middleware_stack = ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let api = Router::new()
        .route("/chat/completions", post(chat::chat_completions))
        .route("/models", get(models::list_models))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            rate_limit_middleware,
        ));

    let router = Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health::health_check))
        .layer(axum_middleware::from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::max(settings.request.max_body_bytes))
        .with_state(app_state)
        .layer(middleware_stack);

    Ok(router)
}
