//! Per-instrument volume monitor.
//!
//! Owns the delta detector, the sliding window and the alert latch for one
//! instrument and runs them in a fixed order for every input:
//! detect → add → evict → evaluate.
//!
//! Pushed trades carry no period, so they are bucketed into one-minute
//! periods by observation time. Each bucket that closes is fed to the
//! predicate the same way a candle rollover is.

use crate::alert::{AlertState, AlertStateMachine};
use crate::config::DetectorConfig;
use crate::delta::{DeltaVolumeDetector, Detection};
use crate::error::{DetectorError, DetectorResult};
use crate::signal::AlertSignal;
use crate::window::{Eviction, SlidingWindowAggregator};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};
use volwatch_core::{Instrument, PeriodSnapshot, TradeEvent, Volume};
use volwatch_telemetry::Metrics;

/// Bucket length for pushed trades; matches the 1m candle interval.
const TRADE_PERIOD_SECS: i64 = 60;

/// Cap on empty buckets recorded after a quiet gap.
const MAX_EMPTY_PERIODS: i64 = 60;

/// Trade volume accumulated in the current one-minute bucket.
#[derive(Debug, Clone, Copy)]
struct TradePeriod {
    key: i64,
    volume: Volume,
}

fn trade_period_key(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(TRADE_PERIOD_SECS)
}

/// Result of one monitor step.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    /// Event added to the window in this step, if any.
    pub event: Option<TradeEvent>,
    /// What the delta detector decided (snapshot inputs only).
    pub detection: Option<Detection>,
    pub evicted: Eviction,
    /// Window sum after eviction.
    pub sum: Volume,
    pub event_count: usize,
    pub state: AlertState,
    /// Set on a Normal → Alerted transition.
    pub signal: Option<AlertSignal>,
}

#[derive(Debug)]
pub struct VolumeMonitor {
    instrument: Instrument,
    label: String,
    threshold: Volume,
    detector: DeltaVolumeDetector,
    window: SlidingWindowAggregator,
    alert: AlertStateMachine,
    trade_period: Option<TradePeriod>,
}

impl VolumeMonitor {
    /// Build a monitor from a validated detector config.
    pub fn new(instrument: Instrument, config: &DetectorConfig) -> DetectorResult<Self> {
        config.validate().map_err(DetectorError::Config)?;

        let window = SlidingWindowAggregator::new(config.window())?;
        let alert = AlertStateMachine::new(config.build_predicate());
        let label = instrument.to_string();

        info!(
            instrument = %label,
            window_ms = config.window_ms,
            threshold = %config.threshold,
            rule = alert.rule(),
            "Volume monitor created"
        );

        Ok(Self {
            instrument,
            label,
            threshold: config.threshold_volume(),
            detector: DeltaVolumeDetector::new(),
            window,
            alert,
            trade_period: None,
        })
    }

    /// Feed a cumulative period snapshot observed at `now`.
    pub fn on_snapshot(&mut self, snapshot: PeriodSnapshot, now: DateTime<Utc>) -> MonitorOutcome {
        let detection = self.detector.observe(snapshot, now);

        match &detection {
            Detection::Anomaly { .. } => Metrics::volume_anomaly(&self.label),
            Detection::Rollover {
                closed_period_volume,
                ..
            } => self.alert.record_closed_period(*closed_period_volume),
            _ => {}
        }

        let event = detection.event().cloned();
        let mut outcome = self.settle(event, "snapshot", now);
        outcome.detection = Some(detection);
        outcome
    }

    /// Feed an already incremental trade (push mode).
    pub fn on_trade(&mut self, event: TradeEvent, now: DateTime<Utc>) -> MonitorOutcome {
        let key = trade_period_key(event.occurred_at());
        self.roll_trade_period(key);
        let period = self.trade_period.get_or_insert(TradePeriod {
            key,
            volume: Volume::ZERO,
        });
        period.volume = period.volume.saturating_add(event.volume());

        self.settle(Some(event), "trade", now)
    }

    /// Advance time without new volume so the window decays.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> MonitorOutcome {
        self.roll_trade_period(trade_period_key(now));
        self.settle(None, "tick", now)
    }

    /// Close the current trade bucket if `key` is past it. Skipped minutes
    /// are recorded as empty periods. No-op until the first trade.
    fn roll_trade_period(&mut self, key: i64) {
        let Some(period) = self.trade_period else {
            return;
        };
        if key <= period.key {
            return;
        }

        self.alert.record_closed_period(period.volume);
        let empty = (key - period.key - 1).min(MAX_EMPTY_PERIODS);
        for _ in 0..empty {
            self.alert.record_closed_period(Volume::ZERO);
        }
        debug!(
            instrument = %self.label,
            closed_key = period.key,
            closed_volume = %period.volume,
            empty,
            "Trade period closed"
        );

        self.trade_period = Some(TradePeriod {
            key,
            volume: Volume::ZERO,
        });
    }

    fn settle(
        &mut self,
        event: Option<TradeEvent>,
        source: &str,
        now: DateTime<Utc>,
    ) -> MonitorOutcome {
        let event = match event.map(|e| self.window.add(e.clone()).map(|()| e)) {
            Some(Ok(event)) => {
                Metrics::trade_event(&self.label, source);
                debug!(
                    instrument = %self.label,
                    source,
                    volume = %event.volume(),
                    "Trade event added"
                );
                Some(event)
            }
            Some(Err(e)) => {
                warn!(instrument = %self.label, source, error = %e, "Dropping trade event");
                None
            }
            None => None,
        };

        let evicted = self.window.evict_expired(now);
        if !evicted.is_empty() {
            debug!(
                instrument = %self.label,
                count = evicted.count,
                volume = %evicted.volume,
                "Evicted expired events"
            );
        }

        let sum = self.window.current_sum();
        let event_count = self.window.event_count();
        let breach = self.alert.evaluate(sum);
        let state = self.alert.state();

        Metrics::window_state(&self.label, sum.inner().to_f64().unwrap_or(0.0), event_count);
        Metrics::alert_state(&self.label, self.alert.is_alerted());

        let signal = breach.map(|breach| {
            AlertSignal::from_breach(&self.label, breach, self.threshold, event_count, now)
        });

        MonitorOutcome {
            event,
            detection: None,
            evicted,
            sum,
            event_count,
            state,
            signal,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Instrument label used in logs and metrics.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn threshold(&self) -> Volume {
        self.threshold
    }

    pub fn current_sum(&self) -> Volume {
        self.window.current_sum()
    }

    pub fn event_count(&self) -> usize {
        self.window.event_count()
    }

    pub fn state(&self) -> AlertState {
        self.alert.state()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.detector.anomaly_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertRule;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn monitor(label: &str) -> VolumeMonitor {
        VolumeMonitor::new(
            Instrument::new(label, "KRW").unwrap(),
            &DetectorConfig::default(),
        )
        .unwrap()
    }

    fn snap(key: i64, cumulative: Decimal) -> PeriodSnapshot {
        PeriodSnapshot::new(key, Volume::new(cumulative))
    }

    /// t=0..30 within one period; threshold 10M over a 60s window.
    fn run_first_half(m: &mut VolumeMonitor) -> Vec<MonitorOutcome> {
        [
            (0, dec!(0)),
            (10, dec!(4000000)),
            (20, dec!(9000000)),
            (30, dec!(11500000)),
        ]
        .into_iter()
        .map(|(at, cum)| m.on_snapshot(snap(0, cum), t(at)))
        .collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DetectorConfig {
            threshold: dec!(0),
            ..Default::default()
        };
        let result = VolumeMonitor::new(Instrument::new("CRO", "KRW").unwrap(), &config);
        assert!(matches!(result, Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_alert_fires_once_when_window_crosses_threshold() {
        let mut m = monitor("SCN1");
        let outcomes = run_first_half(&mut m);

        assert!(outcomes[..3].iter().all(|o| o.signal.is_none()));
        assert_eq!(outcomes[2].sum, Volume::new(dec!(9000000)));

        let last = &outcomes[3];
        let signal = last.signal.as_ref().expect("alert at t=30");
        assert_eq!(signal.sum, Volume::new(dec!(11500000)));
        assert_eq!(signal.threshold, Volume::new(dec!(10000000)));
        assert_eq!(signal.event_count, 3);
        assert_eq!(signal.instrument, "SCN1/KRW");
        assert_eq!(signal.timestamp, t(30));
        assert_eq!(m.state(), AlertState::Alerted);
    }

    #[test]
    fn test_window_decay_returns_to_normal_without_signal() {
        let mut m = monitor("SCN2");
        run_first_half(&mut m);

        // Cutoff at t=70 is t=10, so the 4M event is evicted (inclusive).
        let outcome = m.on_tick(t(70));
        assert_eq!(outcome.evicted.count, 1);
        assert_eq!(outcome.sum, Volume::new(dec!(7500000)));
        assert!(outcome.signal.is_none());
        assert_eq!(outcome.state, AlertState::Normal);

        // The rest ages out later.
        let outcome = m.on_tick(t(90));
        assert!(outcome.sum.is_zero());
        assert_eq!(outcome.event_count, 0);
    }

    #[test]
    fn test_rearmed_monitor_can_alert_again() {
        let mut m = monitor("SCN3");
        run_first_half(&mut m);
        m.on_tick(t(70));

        let outcome = m.on_snapshot(snap(0, dec!(14000000)), t(75));
        assert_eq!(outcome.sum, Volume::new(dec!(10000000)));
        assert!(outcome.signal.is_some());
    }

    #[test]
    fn test_trade_and_tick_inputs() {
        let mut m = monitor("SCN4");
        let trade = TradeEvent::new(t(0), Volume::new(dec!(6000000)), None).unwrap();
        let outcome = m.on_trade(trade, t(0));
        assert!(outcome.detection.is_none());
        assert_eq!(outcome.event_count, 1);

        let trade = TradeEvent::new(t(5), Volume::new(dec!(6000000)), None).unwrap();
        let outcome = m.on_trade(trade, t(5));
        assert!(outcome.signal.is_some());

        let outcome = m.on_tick(t(65));
        assert!(outcome.sum.is_zero());
        assert_eq!(outcome.state, AlertState::Normal);
    }

    #[test]
    fn test_anomaly_adds_nothing() {
        let mut m = monitor("SCN5");
        m.on_snapshot(snap(0, dec!(500)), t(0));
        let outcome = m.on_snapshot(snap(0, dec!(300)), t(1));

        assert!(outcome.event.is_none());
        assert!(outcome.detection.as_ref().is_some_and(Detection::is_anomaly));
        assert_eq!(outcome.sum, Volume::new(dec!(500)));
        assert_eq!(m.anomaly_count(), 1);
    }

    #[test]
    fn test_rollover_feeds_spike_history() {
        let config = DetectorConfig {
            rule: AlertRule::AbsoluteOrSpike,
            window_ms: 30_000,
            ..Default::default()
        };
        let mut m = VolumeMonitor::new(Instrument::new("SCN6", "KRW").unwrap(), &config).unwrap();

        // Four 1M periods; three close, so the spike average becomes 1M.
        for i in 0..4 {
            m.on_snapshot(snap(i * 60_000, dec!(1000000)), t(i * 60));
        }
        let outcome = m.on_snapshot(snap(3 * 60_000, dec!(3500000)), t(190));

        // Window holds 1M (t=180) + 2.5M (t=190) = 3.5M, 3.5x the average.
        assert_eq!(outcome.sum, Volume::new(dec!(3500000)));
        let signal = outcome.signal.expect("spike alert");
        assert_eq!(signal.rule, "spike");
    }

    fn spike_monitor(label: &str) -> VolumeMonitor {
        let config = DetectorConfig {
            rule: AlertRule::AbsoluteOrSpike,
            ..Default::default()
        };
        VolumeMonitor::new(Instrument::new(label, "KRW").unwrap(), &config).unwrap()
    }

    fn trade(m: &mut VolumeMonitor, at: i64, volume: Decimal) -> MonitorOutcome {
        let event = TradeEvent::new(t(at), Volume::new(volume), None).unwrap();
        m.on_trade(event, t(at))
    }

    #[test]
    fn test_streamed_trades_build_spike_history() {
        let mut m = spike_monitor("SCN7");

        // Ten minutes at a steady 1M per minute: never a spike.
        for at in (0..=600).step_by(6) {
            let outcome = trade(&mut m, at, dec!(100000));
            assert!(outcome.signal.is_none(), "unexpected alert at t={at}");
        }

        let outcome = trade(&mut m, 603, dec!(5000000));
        assert_eq!(outcome.sum, Volume::new(dec!(6000000)));
        let signal = outcome.signal.expect("spike alert");
        assert_eq!(signal.rule, "spike");
    }

    #[test]
    fn test_quiet_minutes_count_as_empty_periods() {
        let mut m = spike_monitor("SCN8");
        trade(&mut m, 0, dec!(1000000));

        // Closes the first bucket and records four empty ones.
        let outcome = m.on_tick(t(300));
        assert!(outcome.sum.is_zero());

        let outcome = trade(&mut m, 301, dec!(1500000));
        let signal = outcome.signal.expect("spike alert");
        assert_eq!(signal.rule, "spike");
    }

    #[test]
    fn test_oversized_snapshots_do_not_reach_the_window() {
        let mut m = monitor("SCN9");
        let huge = dec!(50000000000000000000000000000);

        let outcome = m.on_snapshot(snap(0, huge), t(0));
        assert!(outcome.event.is_none());
        let outcome = m.on_snapshot(snap(60_000, huge), t(1));
        assert!(outcome.event.is_none());
        assert!(m.current_sum().is_zero());
        assert_eq!(m.state(), AlertState::Normal);
    }
}
