//! A request-rate limiter shared by all Map workers.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

/// Hands out at most one permit per period across every caller.
///
/// Workers contend for the same ticker, so adding workers never raises the
/// request rate. A zero period disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    ticker: Option<Mutex<Interval>>,
}

impl RateLimiter {
    /// Creates a limiter firing once per `period`.
    ///
    /// Must be called from within a Tokio runtime. The first permit is
    /// available immediately.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let ticker = (!period.is_zero()).then(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(interval)
        });
        Self { period, ticker }
    }

    /// Gets the period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next permit.
    pub async fn acquire(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.lock().await.tick().await;
        }
    }
}
