//! The shared request gate in front of every model backend.
//!
//! At most `max_requests` calls are released per rolling `window`. Callers
//! that arrive while the window is saturated wait instead of failing, and are
//! released in arrival order: the async mutex is fair and is held across the
//! wait.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateGate {
    max_requests: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    /// `max_requests` below 1 is treated as 1.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// A gate over a one-second window.
    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a request may be issued, then record it.
    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while issued
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                issued.pop_front();
            }

            if issued.len() < self.max_requests {
                issued.push_back(now);
                return;
            }

            // Saturated: the oldest entry leaves the window first
            if let Some(oldest) = issued.front().copied() {
                let ready_at = oldest + self.window;
                debug!(
                    wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                    "Rate gate saturated, waiting"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }
}
