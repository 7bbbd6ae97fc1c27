//! Circuit breaker
//!
//! Per-provider breaker with the classic three-state machine. Counts roll
//! over in generations: every state change (and every interval rollover while
//! Closed) starts a new generation, and results reported against an old
//! generation are discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::chat::{ChatRequest, ChatResponse};
use crate::providers::{ChunkCallback, Provider};
use crate::utils::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures required before the breaker may open.
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close again; also the
    /// number of probe requests admitted while half-open.
    pub success_threshold: u32,
    /// How long the breaker stays open, and the closed-state counting window.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    requests: u32,
    total_failures: u32,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Counts::default();
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// The state machine itself; wrapped around a provider by [`BreakerProvider`].
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        // Closed-state counts roll over every `timeout` so old failures age
        // out of the window.
        let expiry = Some(Instant::now() + config.timeout);

        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Admission check. Returns the current generation on success so the
    /// matching result report can be correlated.
    fn before(&self) -> ProviderResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        match inner.state {
            BreakerState::Open => Err(self.open_error()),
            BreakerState::HalfOpen if inner.counts.requests >= self.config.success_threshold => {
                // Probe quota exhausted; treat like an open circuit.
                Err(self.open_error())
            }
            _ => {
                inner.counts.on_request();
                Ok(inner.generation)
            }
        }
    }

    /// Report the outcome of a call admitted at `generation`.
    fn after(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        if inner.generation != generation {
            return;
        }

        if success {
            inner.counts.on_success();
            if inner.state == BreakerState::HalfOpen
                && inner.counts.consecutive_successes >= self.config.success_threshold
            {
                self.transition(&mut inner, BreakerState::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            match inner.state {
                BreakerState::Closed => {
                    if self.ready_to_trip(&inner.counts) {
                        self.transition(&mut inner, BreakerState::Open, now);
                    }
                }
                BreakerState::HalfOpen => {
                    self.transition(&mut inner, BreakerState::Open, now);
                }
                BreakerState::Open => {}
            }
        }
    }

    /// Both clauses are required: a handful of failures over few calls must
    /// not trip the breaker.
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.requests == 0 {
            return false;
        }
        let failure_ratio = f64::from(counts.total_failures) / f64::from(counts.requests);
        counts.total_failures >= self.config.failure_threshold && failure_ratio >= 0.5
    }

    /// Apply any time-based transition that is due.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => {
                if let Some(expiry) = inner.expiry {
                    if now >= expiry {
                        self.new_generation(inner, now);
                    }
                }
            }
            BreakerState::Open => {
                if let Some(expiry) = inner.expiry {
                    if now >= expiry {
                        self.transition(inner, BreakerState::HalfOpen, now);
                    }
                }
            }
            BreakerState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut Inner, state: BreakerState, now: Instant) {
        if inner.state == state {
            return;
        }

        let from = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        if state == BreakerState::Open {
            warn!(breaker = %self.name, %from, to = %state, "Circuit breaker tripped");
        } else {
            info!(breaker = %self.name, %from, to = %state, "Circuit breaker state change");
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts.clear();
        inner.expiry = match inner.state {
            // Closed counts within a rolling interval of the same length as
            // the open cooldown.
            BreakerState::Closed | BreakerState::Open => Some(now + self.config.timeout),
            BreakerState::HalfOpen => None,
        };
    }

    fn open_error(&self) -> ProviderError {
        ProviderError::service_unavailable(
            format!("circuit breaker for provider {} is open", self.name),
            "circuit_open",
        )
    }
}

/// Provider wrapper feeding call outcomes into a [`CircuitBreaker`].
pub struct BreakerProvider {
    inner: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
}

impl BreakerProvider {
    pub fn new(inner: Arc<dyn Provider>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    fn classify<T>(result: &ProviderResult<T>) -> bool {
        match result {
            Ok(_) => true,
            // 4xx (including 499 cancellations) does not count as a failure.
            Err(err) => !err.is_breaker_failure(),
        }
    }
}

#[async_trait]
impl Provider for BreakerProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let generation = self.breaker.before().map_err(|err| {
            warn!(provider = %self.breaker.name(), "Circuit breaker rejected request");
            err
        })?;

        let result = self.inner.chat(request).await;
        self.breaker.after(generation, Self::classify(&result));

        if let Err(err) = &result {
            warn!(provider = %self.breaker.name(), error = %err, "Circuit breaker observed error");
        }

        result
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()> {
        let generation = self.breaker.before().map_err(|err| {
            warn!(provider = %self.breaker.name(), "Circuit breaker rejected stream request");
            err
        })?;

        let result = self.inner.chat_stream(request, on_chunk).await;
        self.breaker.after(generation, Self::classify(&result));

        if let Err(err) = &result {
            warn!(provider = %self.breaker.name(), error = %err, "Circuit breaker observed stream error");
        }

        result
    }
}

/// Keeps one breaker per provider name and wraps providers with them.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn wrap(&self, provider: Arc<dyn Provider>) -> Arc<dyn Provider> {
        let breaker = Arc::new(CircuitBreaker::new(provider.name(), self.config.clone()));
        self.breakers
            .lock()
            .unwrap()
            .insert(provider.name().to_string(), Arc::clone(&breaker));

        Arc::new(BreakerProvider::new(provider, breaker))
    }

    pub fn state(&self, name: &str) -> Option<BreakerState> {
        let breakers = self.breakers.lock().unwrap();
        breakers.get(name).map(|breaker| breaker.state())
    }
}
