//! Tick sources for the orchestrators.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Yields evaluation times.
///
/// `None` means the source is exhausted and the orchestrator should stop.
pub trait Ticker: Send {
    fn tick(&mut self) -> impl Future<Output = Option<DateTime<Utc>>> + Send;
}

/// Wall-clock ticker on a fixed period.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// First tick fires immediately.
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    /// First tick fires after one period.
    pub fn delayed(period: Duration) -> Self {
        Self::starting_at(Instant::now() + period, period)
    }

    fn starting_at(start: Instant, period: Duration) -> Self {
        let mut interval = interval_at(start, period);
        // A slow poll pushes the schedule back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.interval.tick().await;
        Some(Utc::now())
    }
}
