//! Breach predicates for the alert state machine.
//!
//! A predicate only answers "is this window volume a breach right now"; the
//! latch lives in [`crate::AlertStateMachine`].

use crate::config::SpikeConfig;
use std::collections::VecDeque;
use volwatch_core::Volume;

/// Decides whether a window volume counts as a breach.
pub trait BreachPredicate: Send {
    /// Short rule name used in signals, logs and metric labels.
    fn rule(&self) -> &'static str;

    fn is_breached(&self, window_volume: Volume) -> bool;

    /// Name of the rule that fired, if breached.
    ///
    /// Composite predicates override this to report the member that fired.
    fn breached_rule(&self, window_volume: Volume) -> Option<&'static str> {
        self.is_breached(window_volume).then(|| self.rule())
    }

    /// Feed the final cumulative volume of a period that just closed.
    fn record_closed_period(&mut self, _volume: Volume) {}
}

/// Breached when window volume >= threshold.
#[derive(Debug, Clone)]
pub struct AbsoluteThreshold {
    threshold: Volume,
}

impl AbsoluteThreshold {
    pub fn new(threshold: Volume) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Volume {
        self.threshold
    }
}

impl BreachPredicate for AbsoluteThreshold {
    fn rule(&self) -> &'static str {
        "absolute"
    }

    fn is_breached(&self, window_volume: Volume) -> bool {
        window_volume >= self.threshold
    }
}

/// Breached when window volume spikes relative to recent closed periods.
///
/// Keeps the last `history_cap` closed-period volumes and compares the window
/// volume against the mean of the newest `average_span` of them.
#[derive(Debug, Clone)]
pub struct VolumeSpike {
    config: SpikeConfig,
    history: VecDeque<Volume>,
}

impl VolumeSpike {
    pub fn new(config: SpikeConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_cap);
        Self { config, history }
    }

    /// Mean of the most recent `average_span` closed periods.
    ///
    /// `None` until `min_history` periods have been recorded.
    pub fn average(&self) -> Option<Volume> {
        if self.history.len() < self.config.min_history {
            return None;
        }
        let span = self.config.average_span.min(self.history.len());
        let total: Volume = self.history.iter().rev().take(span).copied().sum();
        Some(Volume::new(total.inner() / rust_decimal::Decimal::from(span)))
    }

    /// Window volume relative to the moving average, if one exists.
    pub fn ratio(&self, window_volume: Volume) -> Option<rust_decimal::Decimal> {
        window_volume.ratio_to(self.average()?)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl BreachPredicate for VolumeSpike {
    fn rule(&self) -> &'static str {
        "spike"
    }

    fn is_breached(&self, window_volume: Volume) -> bool {
        if window_volume.inner() < self.config.min_volume {
            return false;
        }
        // ratio_to is None for a zero average
        self.ratio(window_volume)
            .is_some_and(|ratio| ratio >= self.config.ratio)
    }

    fn record_closed_period(&mut self, volume: Volume) {
        if self.history.len() == self.config.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(volume);
    }
}

/// Breached when any member predicate is breached.
pub struct AnyOf {
    predicates: Vec<Box<dyn BreachPredicate>>,
}

impl AnyOf {
    pub fn new(predicates: Vec<Box<dyn BreachPredicate>>) -> Self {
        Self { predicates }
    }
}

impl BreachPredicate for AnyOf {
    fn rule(&self) -> &'static str {
        "any_of"
    }

    fn is_breached(&self, window_volume: Volume) -> bool {
        self.predicates.iter().any(|p| p.is_breached(window_volume))
    }

    fn breached_rule(&self, window_volume: Volume) -> Option<&'static str> {
        self.predicates
            .iter()
            .find_map(|p| p.breached_rule(window_volume))
    }

    fn record_closed_period(&mut self, volume: Volume) {
        for predicate in &mut self.predicates {
            predicate.record_closed_period(volume);
        }
    }
}
