//! Retry layer
//!
//! Replays transient failures with capped exponential backoff. The backoff
//! sleep races the request's cancellation signal; cancellation wins without a
//! further upstream call. Streams are only retried while nothing has reached
//! the caller yet — once a chunk has been delivered, replaying would hand the
//! consumer duplicate content.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::chat::{ChatRequest, ChatResponse, StreamChunk};
use crate::providers::{ChunkCallback, Provider};
use crate::utils::error::{ProviderError, ProviderResult, RETRYABLE_STATUS_CODES};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub retryable_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            retryable_codes: RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt` (1-based):
    /// `min(max_delay, initial_delay * multiplier^(attempt-1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    fn is_retryable(&self, err: &ProviderError) -> bool {
        self.retryable_codes.contains(&err.status_code)
    }
}

/// Provider wrapper replaying transient failures.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Sleep before a retry attempt, racing the cancellation signal.
    async fn backoff(&self, request: &ChatRequest, attempt: u32) -> ProviderResult<()> {
        let delay = self.config.delay_for(attempt);
        info!(
            provider = self.inner.name(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying request"
        );

        tokio::select! {
            _ = request.context.cancelled() => Err(request.context.cancellation_error()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let mut last_err: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.backoff(request, attempt).await?;
            }

            match self.inner.chat(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(
                            provider = self.inner.name(),
                            attempts = attempt + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if !self.config.is_retryable(&err) {
                        warn!(
                            provider = self.inner.name(),
                            status_code = err.status_code,
                            error = %err,
                            "Non-retryable error, not retrying"
                        );
                        return Err(err);
                    }

                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        status_code = err.status_code,
                        error = %err,
                        "Retryable error, will retry"
                    );
                    last_err = Some(err);
                }
            }
        }

        error!(
            provider = self.inner.name(),
            max_retries = self.config.max_retries,
            "All retry attempts exhausted"
        );

        Err(last_err.unwrap_or_else(|| ProviderError::internal("retry attempts exhausted")))
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()> {
        let mut last_err: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.backoff(request, attempt).await?;
            }

            let mut delivered = false;
            let result = {
                let mut forward = |chunk: &StreamChunk| {
                    delivered = true;
                    (on_chunk)(chunk)
                };
                self.inner.chat_stream(request, &mut forward).await
            };

            match result {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            provider = self.inner.name(),
                            attempts = attempt + 1,
                            "Streaming request succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    if delivered {
                        // The stream is committed; replaying would duplicate
                        // content already handed to the consumer.
                        warn!(
                            provider = self.inner.name(),
                            status_code = err.status_code,
                            error = %err,
                            "Stream failed after delivering chunks, not retrying"
                        );
                        return Err(err);
                    }

                    if !self.config.is_retryable(&err) {
                        warn!(
                            provider = self.inner.name(),
                            status_code = err.status_code,
                            error = %err,
                            "Non-retryable error for streaming, not retrying"
                        );
                        return Err(err);
                    }

                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        status_code = err.status_code,
                        error = %err,
                        "Retryable error for streaming, will retry"
                    );
                    last_err = Some(err);
                }
            }
        }

        error!(
            provider = self.inner.name(),
            max_retries = self.config.max_retries,
            "All retry attempts exhausted for streaming"
        );

        Err(last_err.unwrap_or_else(|| ProviderError::internal("retry attempts exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_growth_is_monotone_and_capped() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3), Duration::from_millis(2000));

        let mut previous = Duration::ZERO;
        for attempt in 1..20 {
            let delay = config.delay_for(attempt);
            assert!(delay >= previous, "delay must not shrink");
            assert!(delay <= config.max_delay, "delay must respect the cap");
            previous = delay;
        }
        assert_eq!(config.delay_for(19), config.max_delay);
    }

    #[test]
    fn test_retryable_set() {
        let config = RetryConfig::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(config.is_retryable(&ProviderError::new(status, "x", "t", "c")));
        }
        assert!(!config.is_retryable(&ProviderError::validation("x", "c")));
        assert!(!config.is_retryable(&ProviderError::cancelled("x")));
    }
}
