//! Fixed-window rate limiting for free-tier model candidates.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Length of one rate-limit window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Calls allowed per window before waiting.
pub const DEFAULT_MAX_CALLS: u32 = 3;

/// Shortest wait once the window is full.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(16);

#[derive(Debug, Default)]
struct WindowState {
    started: Option<Instant>,
    calls: u32,
}

/// Fixed-window limiter shared by every session in the process.
///
/// [`acquire`](Self::acquire) is called before each request to a limited
/// candidate and [`record_call`](Self::record_call) after each successful one.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    min_wait: Duration,
    state: Mutex<WindowState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW, DEFAULT_MIN_WAIT)
    }
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration, min_wait: Duration) -> Self {
        Self {
            max_calls,
            window,
            min_wait,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// How long to wait when the window is full after `elapsed`.
    pub fn wait_duration(&self, elapsed: Duration) -> Duration {
        let remaining = self.window.saturating_sub(elapsed) + Duration::from_secs(1);
        remaining.max(self.min_wait)
    }

    /// Wait until a call is allowed.
    ///
    /// The lock is held while sleeping so concurrent callers queue up behind
    /// the one that hit the limit.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let expired = state
            .started
            .map_or(true, |started| now.duration_since(started) > self.window);
        if expired {
            state.calls = 0;
            state.started = Some(now);
        }

        if state.calls >= self.max_calls {
            let elapsed = state
                .started
                .map(|started| now.duration_since(started))
                .unwrap_or_default();
            if elapsed < self.window {
                let wait = self.wait_duration(elapsed);
                tracing::info!(
                    "Rate limit window full ({} calls), waiting {:.1} seconds",
                    state.calls,
                    wait.as_secs_f64()
                );
                sleep(wait).await;
                state.calls = 0;
                state.started = Some(Instant::now());
            }
        }
    }

    /// Record one successful call in the current window.
    pub async fn record_call(&self) {
        let mut state = self.state.lock().await;
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }
        state.calls += 1;
    }

    /// Calls recorded in the current window.
    pub async fn calls_in_window(&self) -> u32 {
        self.state.lock().await.calls
    }
}
