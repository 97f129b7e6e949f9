//! Process-wide spacing of outbound geocoder requests.
//!
//! Public Nominatim allows **1 request per second** per client, across
//! every address being resolved. A single [`RateLimiter`] is shared (via
//! `Arc`) by all resolver clones so concurrent resolutions queue behind
//! one another instead of each keeping its own timer.
//!
//! Timing uses `tokio::time`, so tests can run on tokio's paused clock.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct LimiterState {
    last_call: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Enforces a minimum interval between backend calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a limiter that spaces calls at least `min_interval` apart.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Creates a limiter from a millisecond interval.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// The configured minimum interval.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a call is allowed, then claims the slot.
    ///
    /// The lock is released while sleeping and the slot re-checked on
    /// wake-up, so a [`penalize`](Self::penalize) issued meanwhile also
    /// holds back callers that were already waiting.
    pub async fn acquire(&self) {
        loop {
            let ready_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                match self.ready_at(&state) {
                    Some(ready_at) if ready_at > now => ready_at,
                    _ => {
                        state.last_call = Some(now);
                        return;
                    }
                }
            };

            log::trace!(
                "Rate limiter waiting {:?}",
                ready_at.saturating_duration_since(Instant::now())
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    fn ready_at(&self, state: &LimiterState) -> Option<Instant> {
        let next_slot = state.last_call.map(|last| last + self.min_interval);
        match (next_slot, state.cooldown_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Blocks every caller for at least `cooldown` from now, e.g. after
    /// the backend answered HTTP 429.
    pub async fn penalize(&self, cooldown: Duration) {
        let until = Instant::now() + cooldown;
        let mut state = self.state.lock().await;
        if state.cooldown_until.is_none_or(|current| current < until) {
            state.cooldown_until = Some(until);
        }
    }
}
