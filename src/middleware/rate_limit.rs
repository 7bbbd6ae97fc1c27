//! Rate limiting middleware
//!
//! Per-credential limiting applied before dispatch: a token bucket for the
//! per-second rate plus fixed wall-clock-aligned windows for per-minute,
//! per-hour and per-day caps. The client map is read-mostly; each client's
//! counters carry their own locks so contention on one key does not block
//! others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use crate::handlers::AppState;
use crate::utils::error::ProviderError;

/// Entries idle longer than this are dropped by the background sweep.
const IDLE_EVICTION: Duration = Duration::from_secs(10 * 60);
/// How often the background sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    /// 0 disables the corresponding window.
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    /// Token bucket capacity.
    pub burst: u32,
    /// Maximum unique credentials tracked; 0 means unbounded.
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            requests_per_minute: 0,
            requests_per_hour: 0,
            requests_per_day: 0,
            burst: 20,
            max_clients: 0,
        }
    }
}

/// Why a request was rejected, with a hint for when to come back.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRejection {
    pub reason: String,
    pub retry_after: Option<Duration>,
}

/// Classic token bucket: capacity `burst`, refilled at `rate` tokens/second.
#[derive(Debug)]
struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Admit iff at least one token is present, atomically decrementing.
    fn allow(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Fixed-window counter resetting at wall-clock-aligned boundaries
/// (truncate to the unit, add the unit).
#[derive(Debug)]
struct WindowCounter {
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    reset_at: SystemTime,
}

fn next_boundary(now: SystemTime, window: Duration) -> SystemTime {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let window_secs = window.as_secs();
    let aligned = secs - secs % window_secs;
    UNIX_EPOCH + Duration::from_secs(aligned + window_secs)
}

impl WindowCounter {
    fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState {
                count: 0,
                reset_at: next_boundary(SystemTime::now(), window),
            }),
        }
    }

    fn allow(&self, limit: u32, window: Duration) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap();
        let now = SystemTime::now();

        if now > state.reset_at {
            state.count = 1;
            state.reset_at = next_boundary(now, window);
            return Ok(());
        }

        if state.count >= limit {
            let retry_after = state
                .reset_at
                .duration_since(now)
                .unwrap_or(Duration::ZERO);
            return Err(retry_after);
        }

        state.count += 1;
        Ok(())
    }
}

/// Per-credential limiter state.
#[derive(Debug)]
struct ClientLimiter {
    second_bucket: TokenBucket,
    minute_window: WindowCounter,
    hour_window: WindowCounter,
    day_window: WindowCounter,
    /// Unix millis of the last request; used for eviction ordering.
    last_seen: AtomicU64,
}

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ClientLimiter {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            second_bucket: TokenBucket::new(config.requests_per_second, config.burst),
            minute_window: WindowCounter::new(MINUTE),
            hour_window: WindowCounter::new(HOUR),
            day_window: WindowCounter::new(DAY),
            last_seen: AtomicU64::new(unix_millis()),
        }
    }

    fn touch(&self) {
        self.last_seen.store(unix_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_seen.load(Ordering::Relaxed);
        Duration::from_millis(unix_millis().saturating_sub(last))
    }
}

/// Keyed collection of client limiters plus the shared configuration.
pub struct RateLimiter {
    clients: RwLock<HashMap<String, Arc<ClientLimiter>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Apply the four checks in order; the first failure short-circuits.
    pub fn check(&self, key: &str) -> Result<(), RateLimitRejection> {
        let client = self.client(key);
        client.touch();

        if !client.second_bucket.allow() {
            return Err(RateLimitRejection {
                reason: "Rate limit exceeded (per second)".to_string(),
                retry_after: None,
            });
        }

        let windows = [
            (self.config.requests_per_minute, &client.minute_window, MINUTE, "per minute"),
            (self.config.requests_per_hour, &client.hour_window, HOUR, "per hour"),
            (self.config.requests_per_day, &client.day_window, DAY, "per day"),
        ];

        for (limit, window, duration, label) in windows {
            if limit == 0 {
                continue;
            }
            if let Err(retry_after) = window.allow(limit, duration) {
                return Err(RateLimitRejection {
                    reason: format!(
                        "Rate limit exceeded ({label}): retry after {}s",
                        retry_after.as_secs()
                    ),
                    retry_after: Some(retry_after),
                });
            }
        }

        Ok(())
    }

    /// Number of tracked credentials.
    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    fn client(&self, key: &str) -> Arc<ClientLimiter> {
        {
            let clients = self.clients.read().unwrap();
            if let Some(client) = clients.get(key) {
                return Arc::clone(client);
            }
        }

        let mut clients = self.clients.write().unwrap();
        // Double-check after acquiring the write lock.
        if let Some(client) = clients.get(key) {
            return Arc::clone(client);
        }

        if self.config.max_clients > 0 && clients.len() >= self.config.max_clients {
            Self::evict_oldest(&mut clients, self.config.max_clients / 4);
        }

        let client = Arc::new(ClientLimiter::new(&self.config));
        clients.insert(key.to_string(), Arc::clone(&client));

        client
    }

    /// Drop the `count` least recently seen entries.
    fn evict_oldest(clients: &mut HashMap<String, Arc<ClientLimiter>>, count: usize) {
        if count == 0 || clients.is_empty() {
            return;
        }

        let mut entries: Vec<(String, u64)> = clients
            .iter()
            .map(|(key, client)| (key.clone(), client.last_seen.load(Ordering::Relaxed)))
            .collect();
        entries.sort_by_key(|(_, last_seen)| *last_seen);

        let evicted = count.min(entries.len());
        for (key, _) in entries.into_iter().take(count) {
            clients.remove(&key);
        }

        info!(evicted, remaining = clients.len(), "Rate limiter evicted old clients");
    }

    /// Remove entries idle longer than the eviction window.
    pub fn sweep(&self) {
        let mut clients = self.clients.write().unwrap();
        clients.retain(|_, client| client.idle_for() <= IDLE_EVICTION);
    }

    /// Spawn the background sweep task. It runs for the process lifetime.
    pub fn start_sweeper(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });
    }
}

/// Extract the credential from the `Authorization` header: the bearer token
/// when prefixed, the raw value otherwise.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if value.is_empty() {
        return None;
    }

    let key = value.strip_prefix("Bearer ").unwrap_or(value);
    if key.is_empty() {
        return None;
    }

    Some(key.to_string())
}

/// Axum middleware applying the limiter to every `/api/v1` request.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    debug!("Executing rate limit check");

    let Some(api_key) = extract_api_key(request.headers()) else {
        return ProviderError::unauthorized("missing API key in Authorization header")
            .into_response();
    };

    if let Err(rejection) = state.rate_limiter.check(&api_key) {
        warn!(
            api_key = truncate(&api_key, 8),
            reason = %rejection.reason,
            "Rate limit exceeded"
        );

        let body = serde_json::json!({
            "error": {
                "message": rejection.reason,
                "type": "rate_limit_error",
                "code": "rate_limit_exceeded",
            }
        });

        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "60")],
            axum::Json(body),
        )
            .into_response();
    }

    next.run(request).await
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        &s[..max_len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rps: f64, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rps,
            burst,
            ..Default::default()
        }
    }

    #[test]
    fn test_bucket_burst_then_reject() {
        let limiter = RateLimiter::new(config(0.001, 2));

        assert!(limiter.check("key").is_ok());
        assert!(limiter.check("key").is_ok());

        let rejection = limiter.check("key").unwrap_err();
        assert!(rejection.reason.contains("per second"));
        assert!(rejection.retry_after.is_none());
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(config(50.0, 1));

        assert!(limiter.check("key").is_ok());
        assert!(limiter.check("key").is_err());

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check("key").is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(config(0.001, 1));

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn test_minute_window_rejects_with_retry_hint() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1000.0,
            burst: 1000,
            requests_per_minute: 2,
            ..Default::default()
        });

        assert!(limiter.check("key").is_ok());
        assert!(limiter.check("key").is_ok());

        let rejection = limiter.check("key").unwrap_err();
        assert!(rejection.reason.contains("per minute"));
        let retry_after = rejection.retry_after.unwrap();
        assert!(retry_after <= MINUTE);
    }

    #[test]
    fn test_window_boundary_alignment() {
        let now = SystemTime::now();
        let boundary = next_boundary(now, MINUTE);

        let boundary_secs = boundary.duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(boundary_secs % 60, 0);
        assert!(boundary > now);
        assert!(boundary.duration_since(now).unwrap() <= MINUTE);
    }

    #[test]
    fn test_disabled_windows_are_skipped() {
        let limiter = RateLimiter::new(config(1000.0, 1000));
        for _ in 0..100 {
            assert!(limiter.check("key").is_ok());
        }
    }

    #[test]
    fn test_max_clients_evicts_oldest_quarter() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1000.0,
            burst: 1000,
            max_clients: 8,
            ..Default::default()
        });

        for i in 0..8 {
            limiter.check(&format!("key-{i}")).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(limiter.client_count(), 8);

        limiter.check("key-new").unwrap();
        // 25% of capacity evicted, then the new key inserted.
        assert_eq!(limiter.client_count(), 7);

        let clients = limiter.clients.read().unwrap();
        assert!(!clients.contains_key("key-0"));
        assert!(!clients.contains_key("key-1"));
        assert!(clients.contains_key("key-7"));
        assert!(clients.contains_key("key-new"));
    }

    #[test]
    fn test_sweep_drops_idle_entries() {
        let limiter = RateLimiter::new(config(1000.0, 1000));
        limiter.check("stale").unwrap();

        {
            let clients = limiter.clients.read().unwrap();
            let old = unix_millis() - (IDLE_EVICTION.as_millis() as u64 + 1000);
            clients["stale"].last_seen.store(old, Ordering::Relaxed);
        }

        limiter.check("fresh").unwrap();
        limiter.sweep();

        let clients = limiter.clients.read().unwrap();
        assert!(!clients.contains_key("stale"));
        assert!(clients.contains_key("fresh"));
    }

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer sk-test-123".parse().unwrap());
        assert_eq!(extract_api_key(&headers), Some("sk-test-123".to_string()));

        headers.insert(header::AUTHORIZATION, "raw-key".parse().unwrap());
        assert_eq!(extract_api_key(&headers), Some("raw-key".to_string()));

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(extract_api_key(&headers), None);
    }
}
