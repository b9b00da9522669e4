//! Main application orchestration.
//!
//! Each orchestrator is the single writer of its [`VolumeMonitor`]:
//! - [`PollingOrchestrator`]: tick → fetch candle → monitor
//! - [`StreamOrchestrator`]: socket task → mpsc → monitor, plus an eviction
//!   tick so the window decays when no trades arrive

use crate::config::{AppConfig, Mode};
use crate::error::{AppError, AppResult};
use crate::sink::{AlertDispatcher, ConsoleAlarmSink, LogAlertSink};
use crate::ticker::{IntervalTicker, Ticker};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use volwatch_core::PeriodSnapshot;
use volwatch_detector::{MonitorOutcome, VolumeMonitor};
use volwatch_feed::{CandleClient, FeedError, SnapshotSource};
use volwatch_telemetry::Metrics;
use volwatch_ws::{ConnectionConfig, ConnectionManager, StreamMessage, TradeTick};

/// How long the socket task gets to close after shutdown.
const STREAM_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Log [`Metrics::summary`] at info every `interval` until `shutdown` fires.
///
/// Returns `None` when `interval` is zero.
pub fn spawn_metrics_reporter(
    interval: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    info!(metrics = %Metrics::summary(), "Metrics report");
                }
            }
        }
        debug!("Metrics reporter stopped");
    }))
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Snapshots, trades and ticks processed.
    pub observations: u64,
    /// Trade events added to the window.
    pub events: u64,
    pub alerts: u64,
    pub anomalies: u64,
    pub source_errors: u64,
    /// Trades that could not be turned into events.
    pub rejected_trades: u64,
}

/// Monitor plus sinks; the part both orchestrators share.
pub struct MonitorDriver {
    monitor: VolumeMonitor,
    sinks: AlertDispatcher,
    summary: RunSummary,
}

impl MonitorDriver {
    pub fn new(monitor: VolumeMonitor, sinks: AlertDispatcher) -> Self {
        Self {
            monitor,
            sinks,
            summary: RunSummary::default(),
        }
    }

    pub fn snapshot(&mut self, snapshot: PeriodSnapshot, now: DateTime<Utc>) -> MonitorOutcome {
        let outcome = self.monitor.on_snapshot(snapshot, now);
        self.apply(outcome)
    }

    /// Feed a streamed trade. `None` if the trade was rejected.
    pub fn trade(&mut self, tick: &TradeTick, now: DateTime<Utc>) -> Option<MonitorOutcome> {
        match tick.to_event(now) {
            Ok(event) => {
                let outcome = self.monitor.on_trade(event, now);
                Some(self.apply(outcome))
            }
            Err(e) => {
                self.summary.rejected_trades += 1;
                warn!(error = %e, price = %tick.price, qty = %tick.qty, "Rejected trade");
                None
            }
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> MonitorOutcome {
        let outcome = self.monitor.on_tick(now);
        self.apply(outcome)
    }

    /// Record a failed poll and still advance the window.
    pub fn source_error(&mut self, error: &FeedError, now: DateTime<Utc>) -> MonitorOutcome {
        self.summary.source_errors += 1;
        Metrics::source_error(error.kind());
        warn!(kind = error.kind(), error = %error, "Candle fetch failed, skipping cycle");
        self.tick(now)
    }

    fn apply(&mut self, outcome: MonitorOutcome) -> MonitorOutcome {
        self.summary.observations += 1;

        if let Some(event) = &outcome.event {
            self.summary.events += 1;
            debug!(
                instrument = %self.monitor.label(),
                volume = %event.volume(),
                window_sum = %outcome.sum,
                events = outcome.event_count,
                "Window updated"
            );
        }
        if outcome.detection.as_ref().is_some_and(|d| d.is_anomaly()) {
            self.summary.anomalies += 1;
        }

        if let Some(signal) = &outcome.signal {
            self.summary.alerts += 1;
            warn!(
                instrument = %signal.instrument,
                sum = %signal.sum,
                threshold = %signal.threshold,
                rule = %signal.rule,
                "Window volume crossed threshold"
            );
            let delivered = self.sinks.dispatch(signal);
            debug!(delivered, "Alert dispatched");
        }

        outcome
    }

    pub fn monitor(&self) -> &VolumeMonitor {
        &self.monitor
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}

/// Poll mode: one candle fetch per tick.
pub struct PollingOrchestrator<S, T> {
    driver: MonitorDriver,
    source: S,
    ticker: T,
    shutdown: CancellationToken,
}

impl<S: SnapshotSource, T: Ticker> PollingOrchestrator<S, T> {
    pub fn new(driver: MonitorDriver, source: S, ticker: T, shutdown: CancellationToken) -> Self {
        Self {
            driver,
            source,
            ticker,
            shutdown,
        }
    }

    /// Run until cancelled or the ticker is exhausted.
    pub async fn run(mut self) -> AppResult<MonitorDriver> {
        info!(instrument = %self.driver.monitor().label(), "Polling started");

        loop {
            let now = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }
                tick = self.ticker.tick() => match tick {
                    Some(now) => now,
                    None => {
                        info!("Ticker exhausted, stopping poll loop");
                        break;
                    }
                },
            };

            let fetched = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested during fetch");
                    break;
                }
                result = self.source.fetch_latest() => result,
            };

            match fetched {
                Ok(snapshot) => {
                    self.driver.snapshot(snapshot, now);
                }
                Err(e) => {
                    self.driver.source_error(&e, now);
                }
            }
        }

        Ok(self.driver)
    }
}

/// Stream mode: trades from the socket task, eviction from the ticker.
pub struct StreamOrchestrator<T> {
    driver: MonitorDriver,
    connection: ConnectionConfig,
    ticker: T,
    channel_capacity: usize,
    shutdown: CancellationToken,
}

impl<T: Ticker> StreamOrchestrator<T> {
    pub fn new(
        driver: MonitorDriver,
        connection: ConnectionConfig,
        ticker: T,
        channel_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            driver,
            connection,
            ticker,
            channel_capacity: channel_capacity.max(1),
            shutdown,
        }
    }

    /// Run until cancelled, the ticker is exhausted or the socket task
    /// gives up.
    pub async fn run(mut self) -> AppResult<MonitorDriver> {
        let (message_tx, mut message_rx) = mpsc::channel::<StreamMessage>(self.channel_capacity);
        let ws_shutdown = self.shutdown.child_token();

        info!(
            url = %self.connection.url,
            channel = %self.connection.channel,
            instrument = %self.connection.instrument,
            "Starting stream"
        );

        // The task owns the only sender; the channel closes when it exits.
        let manager = ConnectionManager::new(self.connection.clone(), message_tx, ws_shutdown.clone());
        let ws_handle = tokio::spawn(async move { manager.run().await });

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping stream loop");
                    break;
                }
                msg = message_rx.recv() => match msg {
                    Some(StreamMessage::Trade(tick)) => {
                        self.driver.trade(&tick, Utc::now());
                    }
                    Some(StreamMessage::Candle(snapshot)) => {
                        self.driver.snapshot(snapshot, Utc::now());
                    }
                    None => {
                        warn!("Stream task ended");
                        break;
                    }
                },
                tick = self.ticker.tick() => match tick {
                    Some(now) => {
                        self.driver.tick(now);
                    }
                    None => {
                        info!("Ticker exhausted, stopping stream loop");
                        break;
                    }
                },
            }
        }

        ws_shutdown.cancel();
        match tokio::time::timeout(STREAM_SHUTDOWN_GRACE, ws_handle).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(AppError::Task(format!("stream task: {e}"))),
            Err(_) => warn!("Stream task did not stop in time"),
        }

        Ok(self.driver)
    }
}

/// Top-level application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Create an application from a configuration. Fails on invalid config.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn driver(&self) -> AppResult<MonitorDriver> {
        let instrument = self.config.instrument()?;
        let monitor = VolumeMonitor::new(instrument, &self.config.detector)?;
        let sinks = AlertDispatcher::new()
            .with_sink(LogAlertSink)
            .with_sink(ConsoleAlarmSink::stdout(
                self.config.alarm.enabled,
                self.config.alarm.bell_count,
            ));
        Ok(MonitorDriver::new(monitor, sinks))
    }

    /// Run the configured mode until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<RunSummary> {
        let instrument = self.config.instrument()?;
        info!(
            mode = ?self.config.mode,
            instrument = %instrument,
            threshold = %self.config.detector.threshold,
            window_ms = self.config.detector.window_ms,
            rule = ?self.config.detector.rule,
            "Starting application"
        );

        let driver = self.driver()?;
        let reporter = spawn_metrics_reporter(
            Duration::from_millis(self.config.telemetry.metrics_log_interval_ms),
            shutdown.clone(),
        );
        let driver: AppResult<MonitorDriver> = async {
            match self.config.mode {
                Mode::Poll => {
                    let poll = &self.config.poll;
                    let client = CandleClient::new(&poll.rest_url, &instrument, poll.candle_size)?;
                    info!(url = %client.chart_url(), interval_ms = poll.interval_ms, "Polling candles");
                    let ticker = IntervalTicker::new(Duration::from_millis(poll.interval_ms));
                    PollingOrchestrator::new(driver, client, ticker, shutdown)
                        .run()
                        .await
                }
                Mode::Stream => {
                    let stream = &self.config.stream;
                    let ticker =
                        IntervalTicker::delayed(Duration::from_millis(stream.eviction_tick_ms));
                    StreamOrchestrator::new(
                        driver,
                        self.config.connection_config(instrument),
                        ticker,
                        stream.channel_capacity,
                        shutdown,
                    )
                    .run()
                    .await
                }
            }
        }
        .await;
        if let Some(reporter) = reporter {
            reporter.abort();
        }
        let driver = driver?;

        let summary = driver.summary();
        info!(
            observations = summary.observations,
            events = summary.events,
            alerts = summary.alerts,
            anomalies = summary.anomalies,
            source_errors = summary.source_errors,
            "Shutting down"
        );
        debug!(metrics = %Metrics::render(), "Final metrics");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use volwatch_core::{Instrument, Price, Qty, Volume};
    use volwatch_detector::DetectorConfig;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn driver(symbol: &str) -> MonitorDriver {
        let monitor = VolumeMonitor::new(
            Instrument::new(symbol, "KRW").unwrap(),
            &DetectorConfig::default(),
        )
        .unwrap();
        MonitorDriver::new(monitor, AlertDispatcher::new().with_sink(LogAlertSink))
    }

    #[test]
    fn test_metrics_reporter_disabled_at_zero_interval() {
        assert!(spawn_metrics_reporter(Duration::ZERO, CancellationToken::new()).is_none());
    }

    #[tokio::test]
    async fn test_metrics_reporter_runs_until_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = spawn_metrics_reporter(Duration::from_millis(10), shutdown.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn test_driver_counts_alerts_and_anomalies() {
        let mut d = driver("APP1");
        d.snapshot(PeriodSnapshot::new(0, Volume::new(dec!(6000000))), t(0));
        d.snapshot(PeriodSnapshot::new(0, Volume::new(dec!(5000000))), t(1));
        let outcome = d.snapshot(PeriodSnapshot::new(0, Volume::new(dec!(11000000))), t(2));

        assert!(outcome.signal.is_some());
        let summary = d.summary();
        assert_eq!(summary.observations, 3);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.anomalies, 1);
        assert_eq!(summary.alerts, 1);
    }

    #[test]
    fn test_driver_rejects_negative_trade() {
        let mut d = driver("APP2");
        let tick = TradeTick {
            price: Price::new(dec!(100)),
            qty: Qty::new(dec!(-1)),
            timestamp: None,
        };
        assert!(d.trade(&tick, t(0)).is_none());
        assert_eq!(d.summary().rejected_trades, 1);
        assert_eq!(d.monitor().event_count(), 0);
    }

    #[test]
    fn test_driver_rejects_overflowing_trade() {
        let mut d = driver("APP5");
        let text = r#"{"response_type":"DATA","channel":"TRADE","data":{"price":"79228162514264337593543950335","qty":"2"}}"#;
        let volwatch_ws::Inbound::Data(StreamMessage::Trade(tick)) =
            volwatch_ws::parse_inbound(text).unwrap()
        else {
            panic!("expected trade");
        };

        assert!(d.trade(&tick, t(0)).is_none());
        assert_eq!(d.summary().rejected_trades, 1);
        assert!(d.monitor().current_sum().is_zero());
    }

    #[test]
    fn test_driver_survives_oversized_candles_across_rollover() {
        let mut d = driver("APP6");
        let huge = dec!(50000000000000000000000000000);
        d.snapshot(PeriodSnapshot::new(0, Volume::new(huge)), t(0));
        let outcome = d.snapshot(PeriodSnapshot::new(60_000, Volume::new(huge)), t(60));

        assert!(outcome.event.is_none());
        assert!(outcome.signal.is_none());
        assert_eq!(d.summary().events, 0);
    }

    #[test]
    fn test_source_error_still_evicts() {
        let mut d = driver("APP3");
        d.snapshot(PeriodSnapshot::new(0, Volume::new(dec!(500))), t(0));

        let outcome = d.source_error(&FeedError::Empty, t(61));
        assert!(outcome.sum.is_zero());
        assert_eq!(d.summary().source_errors, 1);
    }

    #[test]
    fn test_application_stops_when_cancelled() {
        let mut config = AppConfig::default();
        config.instrument.symbol = "APP4".to_string();
        config.alarm.enabled = false;
        let app = Application::new(config).unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let summary = tokio_test::block_on(app.run(shutdown)).unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_application_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.detector.window_ms = 0;
        assert!(matches!(Application::new(config), Err(AppError::Config(_))));
    }
}
