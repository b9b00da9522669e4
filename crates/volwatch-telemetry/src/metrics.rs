//! Prometheus metrics for volwatch.
//!
//! Covers:
//! - Sliding window state (volume, event count, alert latch)
//! - Detected trade events and volume anomalies
//! - Alert emissions
//! - Candle source errors and latency
//! - Stream connection state
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which must crash at startup rather than fail
//! silently. These panics only occur during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::proto::MetricType;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

/// Current trailing-window volume in quote currency.
pub static WINDOW_VOLUME: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "volwatch_window_volume",
        "Trailing window volume in quote currency",
        &["instrument"]
    )
    .unwrap()
});

/// Number of trade events currently held in the window.
pub static WINDOW_EVENTS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "volwatch_window_events",
        "Trade events currently inside the trailing window",
        &["instrument"]
    )
    .unwrap()
});

/// Alert latch state (1 = alerted, 0 = normal).
pub static ALERT_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "volwatch_alert_state",
        "Alert state machine latch (1=alerted, 0=normal)",
        &["instrument"]
    )
    .unwrap()
});

/// Total trade events fed into the window.
/// Labels: source (snapshot/trade)
pub static TRADE_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "volwatch_trade_events_total",
        "Total trade events added to the window",
        &["instrument", "source"]
    )
    .unwrap()
});

/// Total alerts emitted.
pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "volwatch_alerts_total",
        "Total volume alerts emitted",
        &["instrument", "rule"]
    )
    .unwrap()
});

/// Same-period cumulative volume decreases.
pub static VOLUME_ANOMALIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "volwatch_volume_anomalies_total",
        "Cumulative volume decreases within an unchanged period",
        &["instrument"]
    )
    .unwrap()
});

/// Candle source failures.
/// Labels: kind (http/status/api/parse/empty)
pub static SOURCE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "volwatch_source_errors_total",
        "Total candle source failures by kind",
        &["kind"]
    )
    .unwrap()
});

/// Candle request latency in milliseconds.
pub static POLL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "volwatch_poll_latency_ms",
        "Candle request latency in milliseconds",
        &["outcome"],
        vec![10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0]
    )
    .unwrap()
});

/// Stream connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "volwatch_ws_connected",
        "Stream connection state (1=connected)"
    )
    .unwrap()
});

/// Stream reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "volwatch_ws_reconnect_total",
        "Total stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Publish the window state after an evaluation.
    pub fn window_state(instrument: &str, volume: f64, events: usize) {
        WINDOW_VOLUME.with_label_values(&[instrument]).set(volume);
        WINDOW_EVENTS
            .with_label_values(&[instrument])
            .set(events as f64);
    }

    pub fn alert_state(instrument: &str, alerted: bool) {
        ALERT_STATE
            .with_label_values(&[instrument])
            .set(if alerted { 1.0 } else { 0.0 });
    }

    pub fn trade_event(instrument: &str, source: &str) {
        TRADE_EVENTS_TOTAL
            .with_label_values(&[instrument, source])
            .inc();
    }

    pub fn alert_emitted(instrument: &str, rule: &str) {
        ALERTS_TOTAL.with_label_values(&[instrument, rule]).inc();
    }

    pub fn volume_anomaly(instrument: &str) {
        VOLUME_ANOMALIES_TOTAL
            .with_label_values(&[instrument])
            .inc();
    }

    pub fn source_error(kind: &str) {
        SOURCE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn poll_latency(outcome: &str, latency_ms: f64) {
        POLL_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }

    /// Like [`Metrics::encode`], empty on failure.
    pub fn render() -> String {
        Self::encode().unwrap_or_default()
    }

    /// Every volwatch sample on one line as `name{label=value} value`.
    /// Histograms report their sample count.
    pub fn summary() -> String {
        let mut samples = Vec::new();
        for family in prometheus::gather() {
            if !family.get_name().starts_with("volwatch_") {
                continue;
            }
            for metric in family.get_metric() {
                let value = match family.get_field_type() {
                    MetricType::COUNTER => metric.get_counter().get_value(),
                    MetricType::GAUGE => metric.get_gauge().get_value(),
                    MetricType::HISTOGRAM => metric.get_histogram().get_sample_count() as f64,
                    _ => continue,
                };
                let labels: Vec<String> = metric
                    .get_label()
                    .iter()
                    .map(|label| format!("{}={}", label.get_name(), label.get_value()))
                    .collect();
                if labels.is_empty() {
                    samples.push(format!("{} {}", family.get_name(), value));
                } else {
                    samples.push(format!(
                        "{}{{{}}} {}",
                        family.get_name(),
                        labels.join(","),
                        value
                    ));
                }
            }
        }
        samples.join(" ")
    }
}
