//! Resilience chain tests
//!
//! Exercises the retry, circuit breaker and failover wrappers against stub
//! providers: attempt counting, backoff timing, the stream-commit rule and
//! breaker trips.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use aigateway::models::chat::{ChatRequest, StreamChunk};
use aigateway::providers::Provider;
use aigateway::resilience::{
    BreakerConfig, BreakerRegistry, BreakerState, FailoverProvider, RetryConfig, RetryProvider,
};
use aigateway::utils::RequestContext;

use common::StubProvider;

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
        multiplier: 2.0,
        ..Default::default()
    }
}

fn request() -> ChatRequest {
    ChatRequest {
        model: "stub-model".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_retry_then_succeed() {
    let stub = StubProvider::fail_then_ok("flaky", 1, 503, "r1", "hi");
    let provider = RetryProvider::new(Arc::clone(&stub) as Arc<dyn Provider>, fast_retry(3));

    let started = Instant::now();
    let response = provider.chat(&request()).await.unwrap();

    assert_eq!(response.id, "r1");
    assert_eq!(stub.call_count(), 2);
    // One backoff sleep of at least the initial delay happened.
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_retry_exhaustion_returns_last_error() {
    let stub = StubProvider::always_fail("down", 503);
    let provider = RetryProvider::new(Arc::clone(&stub) as Arc<dyn Provider>, fast_retry(2));

    let err = provider.chat(&request()).await.unwrap_err();
    assert_eq!(err.status_code, 503);
    // Total attempts = max_retries + 1.
    assert_eq!(stub.call_count(), 3);
}

#[tokio::test]
async fn test_non_retryable_error_is_immediate() {
    let stub = StubProvider::always_fail("strict", 400);
    let provider = RetryProvider::new(Arc::clone(&stub) as Arc<dyn Provider>, fast_retry(3));

    let err = provider.chat(&request()).await.unwrap_err();
    assert_eq!(err.status_code, 400);
    assert_eq!(stub.call_count(), 1);
}

#[tokio::test]
async fn test_retry_backoff_races_cancellation() {
    let stub = StubProvider::always_fail("down", 503);
    let provider = RetryProvider::new(
        Arc::clone(&stub) as Arc<dyn Provider>,
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_secs(30),
            ..Default::default()
        },
    );

    let ctx = RequestContext::new();
    let mut req = request();
    req.context = ctx.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();
    });

    let started = Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(5), provider.chat(&req))
        .await
        .expect("cancellation must win over the backoff sleep")
        .unwrap_err();

    assert_eq!(err.status_code, 499);
    assert!(started.elapsed() < Duration::from_secs(5));
    // The first attempt ran; cancellation prevented the second.
    assert_eq!(stub.call_count(), 1);
}

#[tokio::test]
async fn test_stream_retry_on_establishment_failure() {
    let stub = StubProvider::fail_then_ok("flaky", 1, 503, "r1", "hello");
    let provider = RetryProvider::new(Arc::clone(&stub) as Arc<dyn Provider>, fast_retry(3));

    let mut received: Vec<String> = Vec::new();
    provider
        .chat_stream(&request(), &mut |chunk: &StreamChunk| {
            if let Some(content) = &chunk.choices[0].delta.content {
                received.push(content.clone());
            }
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(stub.call_count(), 2);
    assert_eq!(received, vec!["hello"]);
}

#[tokio::test]
async fn test_stream_not_retried_once_committed() {
    let stub = StubProvider::streaming_fail_after("midfail", &["a", "b"], 503);
    let provider = RetryProvider::new(Arc::clone(&stub) as Arc<dyn Provider>, fast_retry(3));

    let mut received: Vec<String> = Vec::new();
    let err = provider
        .chat_stream(&request(), &mut |chunk: &StreamChunk| {
            if let Some(content) = &chunk.choices[0].delta.content {
                received.push(content.clone());
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.status_code, 503);
    // Committed streams are never replayed: one establishment, no duplicates.
    assert_eq!(stub.call_count(), 1);
    assert_eq!(received, vec!["a", "b"]);
}

#[tokio::test]
async fn test_breaker_opens_after_failures() {
    let breakers = BreakerRegistry::new(BreakerConfig::default());
    let stub = StubProvider::always_fail("dead", 500);
    let provider = breakers.wrap(Arc::clone(&stub) as Arc<dyn Provider>);

    for _ in 0..5 {
        let err = provider.chat(&request()).await.unwrap_err();
        assert_eq!(err.status_code, 500);
    }
    assert_eq!(breakers.state("dead"), Some(BreakerState::Open));

    let started = Instant::now();
    let err = provider.chat(&request()).await.unwrap_err();

    assert_eq!(err.status_code, 503);
    assert_eq!(err.code, "circuit_open");
    assert!(started.elapsed() < Duration::from_millis(100));
    // The sixth request never reached the upstream.
    assert_eq!(stub.call_count(), 5);
}

#[tokio::test]
async fn test_breaker_ignores_client_errors() {
    let breakers = BreakerRegistry::new(BreakerConfig::default());
    let stub = StubProvider::always_fail("picky", 400);
    let provider = breakers.wrap(Arc::clone(&stub) as Arc<dyn Provider>);

    for _ in 0..10 {
        provider.chat(&request()).await.unwrap_err();
    }

    assert_eq!(breakers.state("picky"), Some(BreakerState::Closed));
    assert_eq!(stub.call_count(), 10);
}

#[tokio::test]
async fn test_breaker_recovers_through_half_open() {
    let breakers = BreakerRegistry::new(BreakerConfig {
        failure_threshold: 5,
        success_threshold: 3,
        timeout: Duration::from_millis(50),
    });

    // Fails 5 times, then starts succeeding.
    let stub = StubProvider::fail_then_ok("recovering", 5, 500, "r1", "ok");
    let provider = breakers.wrap(Arc::clone(&stub) as Arc<dyn Provider>);

    for _ in 0..5 {
        provider.chat(&request()).await.unwrap_err();
    }
    assert_eq!(breakers.state("recovering"), Some(BreakerState::Open));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(breakers.state("recovering"), Some(BreakerState::HalfOpen));

    for _ in 0..3 {
        provider.chat(&request()).await.unwrap();
    }
    assert_eq!(breakers.state("recovering"), Some(BreakerState::Closed));
}

#[tokio::test]
async fn test_failover_uses_next_provider() {
    let bad = StubProvider::always_fail("bad", 500);
    let good = StubProvider::ok("good", "r2", "ok");

    let chain = FailoverProvider::new(vec![
        Arc::clone(&bad) as Arc<dyn Provider>,
        Arc::clone(&good) as Arc<dyn Provider>,
    ]);

    let response = chain.chat(&request()).await.unwrap();
    assert_eq!(response.content, "ok");
    assert_eq!(bad.call_count(), 1);
    assert_eq!(good.call_count(), 1);
    assert_eq!(chain.name(), "failover(bad->good)");
}

#[tokio::test]
async fn test_failover_returns_last_error() {
    let first = StubProvider::always_fail("first", 500);
    let second = StubProvider::always_fail("second", 502);

    let chain = FailoverProvider::new(vec![
        Arc::clone(&first) as Arc<dyn Provider>,
        Arc::clone(&second) as Arc<dyn Provider>,
    ]);

    let err = chain.chat(&request()).await.unwrap_err();
    assert_eq!(err.status_code, 502);
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
}

#[tokio::test]
async fn test_failover_stream_does_not_switch_mid_stream() {
    let midfail = StubProvider::streaming_fail_after("midfail", &["partial"], 503);
    let fallback = StubProvider::streaming("fallback", "r3", &["unused"]);

    let chain = FailoverProvider::new(vec![
        Arc::clone(&midfail) as Arc<dyn Provider>,
        Arc::clone(&fallback) as Arc<dyn Provider>,
    ]);

    let mut received: Vec<String> = Vec::new();
    let err = chain
        .chat_stream(&request(), &mut |chunk: &StreamChunk| {
            if let Some(content) = &chunk.choices[0].delta.content {
                received.push(content.clone());
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.status_code, 503);
    assert_eq!(received, vec!["partial"]);
    // Switching after delivery would interleave two models' content.
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn test_failover_stream_switches_on_establishment_failure() {
    let bad = StubProvider::always_fail("bad", 503);
    let good = StubProvider::streaming("good", "r4", &["he", "llo"]);

    let chain = FailoverProvider::new(vec![
        Arc::clone(&bad) as Arc<dyn Provider>,
        Arc::clone(&good) as Arc<dyn Provider>,
    ]);

    let mut received: Vec<String> = Vec::new();
    chain
        .chat_stream(&request(), &mut |chunk: &StreamChunk| {
            if let Some(content) = &chunk.choices[0].delta.content {
                received.push(content.clone());
            }
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(received, vec!["he", "llo"]);
    assert_eq!(bad.call_count(), 1);
    assert_eq!(good.call_count(), 1);
}
