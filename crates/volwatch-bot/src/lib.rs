//! Trade volume alert monitor.
//!
//! Wires a candle or trade source into a [`volwatch_detector::VolumeMonitor`]
//! and dispatches alerts to sinks:
//! - poll mode: REST candle snapshots on a fixed interval
//! - stream mode: WebSocket trades plus a periodic eviction tick

pub mod app;
pub mod config;
pub mod error;
pub mod sink;
pub mod ticker;

pub use app::{
    spawn_metrics_reporter, Application, MonitorDriver, PollingOrchestrator, RunSummary,
    StreamOrchestrator,
};
pub use config::{AppConfig, Mode};
pub use error::{AppError, AppResult};
pub use sink::{AlertDispatcher, AlertSink, ConsoleAlarmSink, LogAlertSink};
pub use ticker::{IntervalTicker, Ticker};
