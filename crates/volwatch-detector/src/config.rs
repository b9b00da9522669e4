//! Detector configuration.

use crate::predicate::{AbsoluteThreshold, AnyOf, BreachPredicate, VolumeSpike};
use chrono::TimeDelta;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use volwatch_core::Volume;

/// Which breach rule drives the alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    /// Window volume >= threshold.
    #[default]
    Absolute,
    /// Absolute threshold, or window volume spiking over the moving average
    /// of recently closed periods.
    AbsoluteOrSpike,
}

/// Moving-average spike rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Fire when window volume / average >= ratio.
    #[serde(default = "default_spike_ratio")]
    pub ratio: Decimal,
    /// Window volume must be at least this large to be compared at all.
    #[serde(default = "default_spike_min_volume")]
    pub min_volume: Decimal,
    /// Closed periods required before the rule can fire.
    #[serde(default = "default_spike_min_history")]
    pub min_history: usize,
    /// How many of the most recent closed periods are averaged.
    #[serde(default = "default_spike_average_span")]
    pub average_span: usize,
    /// How many closed periods are retained.
    #[serde(default = "default_spike_history_cap")]
    pub history_cap: usize,
}

fn default_spike_ratio() -> Decimal {
    Decimal::TWO
}

fn default_spike_min_volume() -> Decimal {
    Decimal::from(1_000_000)
}

fn default_spike_min_history() -> usize {
    3
}

fn default_spike_average_span() -> usize {
    5
}

fn default_spike_history_cap() -> usize {
    10
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            ratio: default_spike_ratio(),
            min_volume: default_spike_min_volume(),
            min_history: default_spike_min_history(),
            average_span: default_spike_average_span(),
            history_cap: default_spike_history_cap(),
        }
    }
}

/// Configuration for volume detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Trailing window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Alert threshold in quote currency.
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,
    /// Breach rule.
    #[serde(default)]
    pub rule: AlertRule,
    /// Spike rule parameters (used by `AlertRule::AbsoluteOrSpike`).
    #[serde(default)]
    pub spike: SpikeConfig,
}

/// Longest accepted window.
pub const MAX_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;

fn default_window_ms() -> u64 {
    60_000
}

fn default_threshold() -> Decimal {
    Decimal::from(10_000_000) // 10M KRW
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            threshold: default_threshold(),
            rule: AlertRule::default(),
            spike: SpikeConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration values.
    ///
    /// Returns Err if:
    /// - threshold <= 0
    /// - window_ms == 0 or window_ms > 30 days
    /// - spike ratio <= 1, or a spike history size is zero or inconsistent
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold <= Decimal::ZERO {
            return Err(format!("threshold ({}) must be positive", self.threshold));
        }

        if self.window_ms == 0 {
            return Err("window_ms must be positive".to_string());
        }

        if self.window_ms > MAX_WINDOW_MS {
            return Err(format!(
                "window_ms ({}) must not exceed {MAX_WINDOW_MS} (30 days)",
                self.window_ms
            ));
        }

        let spike = &self.spike;
        if spike.ratio <= Decimal::ONE {
            return Err(format!("spike.ratio ({}) must be greater than 1", spike.ratio));
        }

        if spike.min_volume.is_sign_negative() {
            return Err(format!(
                "spike.min_volume ({}) must be non-negative",
                spike.min_volume
            ));
        }

        if spike.min_history == 0 || spike.average_span == 0 {
            return Err("spike.min_history and spike.average_span must be positive".to_string());
        }

        if spike.history_cap < spike.average_span || spike.history_cap < spike.min_history {
            return Err(format!(
                "spike.history_cap ({}) must cover average_span ({}) and min_history ({})",
                spike.history_cap, spike.average_span, spike.min_history
            ));
        }

        Ok(())
    }

    /// Window length as a `TimeDelta`.
    pub fn window(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.window_ms as i64)
    }

    /// Threshold as a `Volume`.
    pub fn threshold_volume(&self) -> Volume {
        Volume::new(self.threshold)
    }

    /// Build the breach predicate selected by `rule`.
    pub fn build_predicate(&self) -> Box<dyn BreachPredicate> {
        let absolute = AbsoluteThreshold::new(self.threshold_volume());
        match self.rule {
            AlertRule::Absolute => Box::new(absolute),
            AlertRule::AbsoluteOrSpike => Box::new(AnyOf::new(vec![
                Box::new(absolute),
                Box::new(VolumeSpike::new(self.spike.clone())),
            ])),
        }
    }
}
