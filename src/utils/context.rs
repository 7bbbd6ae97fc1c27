//! Request context and idle-timeout tracking
//!
//! A single cancellation signal travels with each request: client disconnect,
//! the handler's absolute timeout and the streaming idle timeout all cancel
//! the same token, and every suspension point in the pipeline observes it.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::error::ProviderError;

/// Per-request context carrying the cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    /// Trigger cancellation for every observer of this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The error every layer returns when it observes cancellation.
    pub fn cancellation_error(&self) -> ProviderError {
        ProviderError::cancelled("request cancelled")
    }
}

/// Activity stamp backing the streaming idle timeout.
///
/// The deadline is not absolute: every observed chunk refreshes it. A
/// background ticker compares `now - last_activity` against the idle limit
/// and cancels the request context when it is exceeded.
#[derive(Debug)]
pub struct IdleTracker {
    last_activity: Mutex<Instant>,
}

/// How often the idle watcher re-checks the activity stamp.
const IDLE_TICK: Duration = Duration::from_secs(10);

impl IdleTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_activity: Mutex::new(Instant::now()),
        })
    }

    /// Record activity, pushing the idle deadline out.
    pub fn touch(&self) {
        let mut last = self.last_activity.lock().unwrap();
        *last = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity.lock().unwrap();
        last.elapsed()
    }

    /// Spawn the watcher task that cancels `ctx` once the stream has been
    /// idle longer than `idle`. The task exits on its own when the context
    /// is cancelled by any path, so callers only need to cancel on exit.
    pub fn watch(self: &Arc<Self>, ctx: RequestContext, idle: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(IDLE_TICK);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => {
                        if tracker.idle_for() > idle {
                            tracing::warn!(
                                idle_secs = idle.as_secs(),
                                "Stream idle timeout exceeded, cancelling request"
                            );
                            ctx.cancel();
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_observable() {
        let ctx = RequestContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());

        let clone = ctx.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancellation_error_status() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.cancellation_error().status_code, 499);
    }

    #[tokio::test]
    async fn test_touch_resets_idle_clock() {
        let tracker = IdleTracker::new();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(tracker.idle_for() >= Duration::from_millis(30));

        tracker.touch();
        assert!(tracker.idle_for() < Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_watcher_exits_on_cancel() {
        let tracker = IdleTracker::new();
        let ctx = RequestContext::new();
        let handle = tracker.watch(ctx.clone(), Duration::from_secs(180));

        ctx.cancel();
        handle.await.unwrap();
    }
}
