//! Volume alert detection for volwatch.
//!
//! Turns cumulative per-period candle readings into incremental trade events,
//! keeps an exact trailing-window volume sum, and latches alerts so a
//! sustained breach fires once.
//!
//! Pipeline per observation (see [`VolumeMonitor`]):
//! snapshot → [`DeltaVolumeDetector`] → [`SlidingWindowAggregator::add`] →
//! [`SlidingWindowAggregator::evict_expired`] → [`AlertStateMachine::evaluate`].

pub mod alert;
pub mod config;
pub mod delta;
pub mod error;
pub mod monitor;
pub mod predicate;
pub mod signal;
pub mod window;

pub use alert::{AlertState, AlertStateMachine, Breach};
pub use config::{AlertRule, DetectorConfig, SpikeConfig, MAX_WINDOW_MS};
pub use delta::{detect, DeltaVolumeDetector, Detection};
pub use error::{DetectorError, DetectorResult};
pub use monitor::{MonitorOutcome, VolumeMonitor};
pub use predicate::{AbsoluteThreshold, AnyOf, BreachPredicate, VolumeSpike};
pub use signal::AlertSignal;
pub use window::{Eviction, SlidingWindowAggregator};
