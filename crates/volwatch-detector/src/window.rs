//! Trailing time-window volume aggregation.
//!
//! Boundary convention: eviction is inclusive, so after `evict_expired(now)`
//! the window covers the half-open interval `(now - window, now]`. An event
//! exactly `window` old is no longer counted.

use crate::error::{DetectorError, DetectorResult};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use volwatch_core::{TradeEvent, Volume};

/// Result of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eviction {
    /// Number of events removed.
    pub count: usize,
    /// Total volume removed.
    pub volume: Volume,
}

impl Eviction {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Ordered queue of trade events with an incrementally maintained sum.
///
/// Events are expected in time order (producers feed it in real time), so
/// the oldest event is always at the head.
#[derive(Debug, Clone)]
pub struct SlidingWindowAggregator {
    window: TimeDelta,
    events: VecDeque<TradeEvent>,
    running_sum: Volume,
}

impl SlidingWindowAggregator {
    /// Create an empty aggregator.
    ///
    /// Returns `DetectorError::Config` for a zero or negative window.
    pub fn new(window: TimeDelta) -> DetectorResult<Self> {
        if window <= TimeDelta::zero() {
            return Err(DetectorError::Config(format!(
                "window length must be positive, got {window}"
            )));
        }
        Ok(Self {
            window,
            events: VecDeque::new(),
            running_sum: Volume::ZERO,
        })
    }

    /// Append an event. O(1).
    ///
    /// Returns `DetectorError::Overflow` and leaves the window unchanged if
    /// the running sum would overflow.
    pub fn add(&mut self, event: TradeEvent) -> DetectorResult<()> {
        self.running_sum = self
            .running_sum
            .checked_add(event.volume())
            .ok_or_else(|| {
                DetectorError::Overflow(format!("{} + {}", self.running_sum, event.volume()))
            })?;
        self.events.push_back(event);
        Ok(())
    }

    /// Drop every event with `occurred_at <= now - window`.
    ///
    /// Must run before reading `current_sum()` for an alert decision.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> Eviction {
        let mut eviction = Eviction::default();
        // A cutoff before the representable range means nothing has expired.
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return eviction;
        };

        while self
            .events
            .front()
            .is_some_and(|head| head.occurred_at() <= cutoff)
        {
            if let Some(expired) = self.events.pop_front() {
                self.running_sum -= expired.volume();
                eviction.count += 1;
                eviction.volume += expired.volume();
            }
        }

        if self.events.is_empty() {
            // All volume aged out; pin the sum to exactly zero.
            self.running_sum = Volume::ZERO;
        }

        eviction
    }

    /// Sum of volume currently in the window. Never re-sums.
    #[inline]
    pub fn current_sum(&self) -> Volume {
        self.running_sum
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Oldest event still counted.
    pub fn oldest(&self) -> Option<&TradeEvent> {
        self.events.front()
    }
}
