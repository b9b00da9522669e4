//! Alert sinks.
//!
//! Sinks run once per Normal → Alerted transition. A failing sink is logged
//! and does not stop the others or the monitor.

use crate::error::{AppError, AppResult};
use std::io::{self, Stdout, Write};
use tracing::{info, warn};
use volwatch_detector::AlertSignal;
use volwatch_telemetry::Metrics;

/// Receives alert signals.
pub trait AlertSink: Send {
    fn name(&self) -> &'static str;

    fn notify(&mut self, signal: &AlertSignal) -> AppResult<()>;
}

/// Terminal alarm: a banner plus the terminal bell.
pub struct ConsoleAlarmSink<W: Write + Send = Stdout> {
    out: W,
    enabled: bool,
    bell_count: u32,
}

impl ConsoleAlarmSink<Stdout> {
    pub fn stdout(enabled: bool, bell_count: u32) -> Self {
        Self::new(io::stdout(), enabled, bell_count)
    }
}

impl<W: Write + Send> ConsoleAlarmSink<W> {
    pub fn new(out: W, enabled: bool, bell_count: u32) -> Self {
        Self {
            out,
            enabled,
            bell_count,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_alarm(&mut self, signal: &AlertSignal) -> io::Result<()> {
        let rule = "=".repeat(50);
        writeln!(self.out)?;
        writeln!(self.out, "{rule}")?;
        writeln!(self.out, "VOLUME ALERT: {}", signal.instrument)?;
        writeln!(
            self.out,
            "  window volume {} {} (threshold {})",
            signal.sum.whole(),
            quote_of(&signal.instrument),
            signal.threshold.whole()
        )?;
        writeln!(
            self.out,
            "  {} trades, rule={}, at {}",
            signal.event_count,
            signal.rule,
            signal.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        write!(self.out, "{}", "\x07".repeat(self.bell_count as usize))?;
        writeln!(self.out, "{rule}")?;
        self.out.flush()
    }
}

fn quote_of(instrument: &str) -> &str {
    instrument.rsplit('/').next().unwrap_or(instrument)
}

impl<W: Write + Send> AlertSink for ConsoleAlarmSink<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn notify(&mut self, signal: &AlertSignal) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.write_alarm(signal)
            .map_err(|e| AppError::Sink(format!("console alarm failed: {e}")))
    }
}

/// Structured log event plus the alert counter.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&mut self, signal: &AlertSignal) -> AppResult<()> {
        Metrics::alert_emitted(&signal.instrument, &signal.rule);
        info!(
            instrument = %signal.instrument,
            sum = %signal.sum,
            threshold = %signal.threshold,
            event_count = signal.event_count,
            rule = %signal.rule,
            timestamp = %signal.timestamp,
            "Volume alert"
        );
        Ok(())
    }
}

/// Fans a signal out to every sink.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver to every sink. Returns how many succeeded.
    pub fn dispatch(&mut self, signal: &AlertSignal) -> usize {
        let mut delivered = 0;
        for sink in &mut self.sinks {
            match sink.notify(signal) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(sink = sink.name(), error = %e, "Alert sink failed"),
            }
        }
        delivered
    }
}
