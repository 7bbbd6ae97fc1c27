//! Unified LLM chat gateway server
//!
//! HTTP gateway that fronts many LLM chat completion APIs behind a single
//! endpoint, with failover, retries, circuit breaking and rate limiting.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use aigateway::handlers::create_router;
use aigateway::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("Failed to load settings")?;

    init_logging(&settings);
    info!("Initializing application...");

    info!(
        requests_per_second = settings.rate_limit.requests_per_second,
        requests_per_minute = settings.rate_limit.requests_per_minute,
        requests_per_hour = settings.rate_limit.requests_per_hour,
        requests_per_day = settings.rate_limit.requests_per_day,
        burst = settings.rate_limit.burst,
        "Rate limiting enabled"
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app = create_router(settings).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Gateway listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Chat endpoint: http://{}/api/v1/chat/completions", addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutting down server...");
    let _ = shutdown_tx.send(());

    // Bounded drain window; in-flight requests past it are dropped.
    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(result) => {
            result
                .context("Server task panicked")?
                .context("Server error")?;
            info!("Server exited");
        }
        Err(_) => {
            warn!("Graceful shutdown window elapsed, forcing exit");
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialize logging system.
fn init_logging(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.logging.level.clone()));

    if settings.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
