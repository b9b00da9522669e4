//! Alert signal emitted to sinks.

use crate::alert::Breach;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use volwatch_core::Volume;

/// One alert, emitted on a Normal → Alerted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSignal {
    /// Instrument label, e.g. "CRO/KRW".
    pub instrument: String,
    /// Window sum at evaluation time.
    pub sum: Volume,
    pub threshold: Volume,
    /// Events inside the window when the alert fired.
    pub event_count: usize,
    /// Evaluation time.
    pub timestamp: DateTime<Utc>,
    /// Rule that fired.
    pub rule: String,
}

impl AlertSignal {
    pub fn from_breach(
        instrument: impl Into<String>,
        breach: Breach,
        threshold: Volume,
        event_count: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            sum: breach.sum,
            threshold,
            event_count,
            timestamp,
            rule: breach.rule.to_string(),
        }
    }
}

impl fmt::Display for AlertSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} window volume {} >= {} ({} events, rule={}) at {}",
            self.instrument,
            self.sum.whole(),
            self.threshold.whole(),
            self.event_count,
            self.rule,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
