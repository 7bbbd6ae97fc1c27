//! Error handling module
//!
//! Defines the provider error type shared across every internal boundary.
//! Each layer either passes a [`ProviderError`] through unchanged or wraps
//! whatever went wrong into one; the HTTP handler is the only place that
//! serializes it onto the wire.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// HTTP status used when the caller cancelled the request (client closed).
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// Status codes that warrant a retry of the upstream call.
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Error surfaced by providers and every wrapper around them.
///
/// Carries an HTTP-style status code plus the OpenAI-compatible error
/// envelope fields (`type`, `code`, `param`). `raw` keeps the upstream
/// response bytes so integrators can debug vendor-specific failures.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error_type} ({status_code}): {message}")]
pub struct ProviderError {
    pub status_code: u16,
    pub message: String,
    pub error_type: String,
    pub code: String,
    pub param: String,
    pub raw: Option<Vec<u8>>,
}

impl ProviderError {
    /// Generic constructor; prefer the named helpers below.
    pub fn new(
        status_code: u16,
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_type: error_type.into(),
            code: code.into(),
            param: String::new(),
            raw: None,
        }
    }

    /// 400 invalid_request_error with a machine-readable code.
    pub fn validation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(400, message, "invalid_request_error", code)
    }

    /// 401 authentication_error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message, "authentication_error", "unauthorized")
    }

    /// 500 internal_error for unexpected gateway-side failures.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message, "internal_error", "internal_error")
    }

    /// 503 service_unavailable (circuit open, upstream unreachable).
    pub fn service_unavailable(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(503, message, "service_unavailable", code)
    }

    /// 429 produced by the gateway's own rate limiter.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(429, message, "rate_limit_error", "rate_limit_exceeded")
    }

    /// 499 for caller cancellation (disconnect, handler timeout, idle timeout).
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(STATUS_CLIENT_CLOSED, message, "client_closed", "request_cancelled")
    }

    /// Error reported by an upstream API, keeping its envelope fields and body.
    pub fn upstream(
        status_code: u16,
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
        param: impl Into<String>,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_type: error_type.into(),
            code: code.into(),
            param: param.into(),
            raw: Some(raw),
        }
    }

    /// Attach raw upstream bytes to an existing error.
    pub fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether the retry layer may replay the call.
    pub fn is_retryable(&self) -> bool {
        RETRYABLE_STATUS_CODES.contains(&self.status_code)
    }

    /// Whether the circuit breaker counts this as a failure.
    ///
    /// 4xx responses indicate a client-side problem and must not trip the
    /// breaker; that includes 499 cancellations.
    pub fn is_breaker_failure(&self) -> bool {
        self.status_code >= 500
    }

    /// Whether this error came from a cancellation.
    pub fn is_cancellation(&self) -> bool {
        self.status_code == STATUS_CLIENT_CLOSED
    }

    /// JSON body shape shared by the sync path and the SSE error event:
    /// `{"error": {message, type, code, param, statusCode}, "raw"?}`.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": {
                "message": self.message,
                "type": self.error_type,
                "code": self.code,
                "param": self.param,
                "statusCode": self.status_code,
            }
        });

        if let Some(raw) = &self.raw {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(raw) {
                body["raw"] = value;
            }
        }

        body
    }

    fn http_status(&self) -> StatusCode {
        // 499 has no StatusCode constant; build it from the numeric value.
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        if self.status_code >= 500 {
            tracing::error!("Provider error: {} - Status code: {}", self, status);
        } else {
            tracing::warn!("Client error: {} - Status code: {}", self.error_type, status);
        }

        (status, Json(self.to_body())).into_response()
    }
}

/// Result type alias used across the provider pipeline.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_status_codes() {
        assert_eq!(ProviderError::validation("bad", "invalid_json").status_code, 400);
        assert_eq!(ProviderError::unauthorized("no key").status_code, 401);
        assert_eq!(ProviderError::rate_limited("slow down").status_code, 429);
        assert_eq!(ProviderError::cancelled("gone").status_code, 499);
        assert_eq!(ProviderError::internal("boom").status_code, 500);
        assert_eq!(ProviderError::service_unavailable("down", "circuit_open").status_code, 503);
    }

    #[test]
    fn test_retryable_classification() {
        for status in RETRYABLE_STATUS_CODES {
            let err = ProviderError::new(status, "x", "t", "c");
            assert!(err.is_retryable(), "{} should be retryable", status);
        }

        assert!(!ProviderError::validation("x", "c").is_retryable());
        assert!(!ProviderError::unauthorized("x").is_retryable());
        assert!(!ProviderError::cancelled("x").is_retryable());
    }

    #[test]
    fn test_breaker_classification_ignores_4xx() {
        assert!(ProviderError::internal("x").is_breaker_failure());
        assert!(ProviderError::new(502, "x", "t", "c").is_breaker_failure());
        assert!(!ProviderError::validation("x", "c").is_breaker_failure());
        assert!(!ProviderError::new(429, "x", "t", "c").is_breaker_failure());
        assert!(!ProviderError::cancelled("x").is_breaker_failure());
    }

    #[test]
    fn test_body_round_trips_status_code() {
        let err = ProviderError::upstream(
            502,
            "upstream exploded",
            "api_error",
            "bad_gateway",
            "",
            br#"{"detail":"boom"}"#.to_vec(),
        );

        let body = err.to_body();
        assert_eq!(body["error"]["statusCode"], 502);
        assert_eq!(body["error"]["message"], "upstream exploded");
        assert_eq!(body["raw"]["detail"], "boom");
    }

    #[test]
    fn test_non_json_raw_is_omitted() {
        let err = ProviderError::internal("x").with_raw(b"not json".to_vec());
        let body = err.to_body();
        assert!(body.get("raw").is_none());
    }
}
