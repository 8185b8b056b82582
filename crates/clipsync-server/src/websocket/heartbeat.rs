//! Ping/pong liveness tracking.
//!
//! The writer pings on a fixed ticker; the reader keeps a deadline that only
//! a Pong pushes forward. A peer that stops answering pings is dropped once
//! the deadline passes, even if it keeps sending data.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Read-side liveness deadline.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    timeout: Duration,
    deadline: Instant,
}

impl Liveness {
    /// Start tracking with the deadline `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// A Pong arrived: push the deadline out by a full timeout.
    pub fn pong_received(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// Instant after which the peer counts as dead.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Ticker for server-initiated pings. The first tick fires one full
/// `interval` after creation, not immediately.
pub fn ping_ticker(interval: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_without_pong() {
        let start = Instant::now();
        let liveness = Liveness::new(Duration::from_secs(60));
        assert_eq!(liveness.deadline(), start + Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(Instant::now() >= liveness.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_extends_deadline() {
        let mut liveness = Liveness::new(Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(50)).await;
        liveness.pong_received();
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(Instant::now() < liveness.deadline());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(Instant::now() >= liveness.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_skips_immediate_tick() {
        let start = Instant::now();
        let mut ticker = ping_ticker(Duration::from_secs(54));
        let _ = ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(54));
        let _ = ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(108));
    }
}
