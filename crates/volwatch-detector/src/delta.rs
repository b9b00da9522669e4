//! Incremental volume detection from cumulative period snapshots.
//!
//! Candle sources report volume accumulated within the current period. Each
//! new reading is compared against the previous one:
//! - first reading: the whole cumulative volume is new
//! - period key changed: the whole cumulative volume of the new period is new
//! - same period: only the positive growth is new
//!
//! This counts every unit of reported volume exactly once as long as the
//! source is monotonic within a period.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use volwatch_core::{PeriodSnapshot, Price, TradeEvent, Volume};

/// Outcome of comparing a snapshot with its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// First snapshot ever seen.
    Initial { event: Option<TradeEvent> },
    /// Period key changed; `closed_period_volume` is the last cumulative
    /// volume seen for the previous period.
    Rollover {
        event: Option<TradeEvent>,
        closed_period_volume: Volume,
    },
    /// Same period, cumulative volume grew.
    Growth { event: TradeEvent },
    /// Same period, nothing new.
    Unchanged,
    /// Same period, cumulative volume went down. Never a negative trade.
    Anomaly { previous: Volume, current: Volume },
}

impl Detection {
    /// The emitted trade event, if any.
    pub fn event(&self) -> Option<&TradeEvent> {
        match self {
            Self::Initial { event } | Self::Rollover { event, .. } => event.as_ref(),
            Self::Growth { event } => Some(event),
            Self::Unchanged | Self::Anomaly { .. } => None,
        }
    }

    pub fn into_event(self) -> Option<TradeEvent> {
        match self {
            Self::Initial { event } | Self::Rollover { event, .. } => event,
            Self::Growth { event } => Some(event),
            Self::Unchanged | Self::Anomaly { .. } => None,
        }
    }

    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::Anomaly { .. })
    }
}

/// Build an event for strictly positive volume observed at `now`.
fn positive_event(now: DateTime<Utc>, volume: Volume, price: Option<Price>) -> Option<TradeEvent> {
    if !volume.is_positive() {
        return None;
    }
    match TradeEvent::new(now, volume, price) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Dropping detected volume");
            None
        }
    }
}

/// Compare `current` against `previous` and decide what volume is new.
///
/// The emitted event is stamped with `now` (when the volume was observed),
/// never with the period key.
pub fn detect(
    previous: Option<&PeriodSnapshot>,
    current: &PeriodSnapshot,
    now: DateTime<Utc>,
) -> Detection {
    let Some(previous) = previous else {
        return Detection::Initial {
            event: positive_event(now, current.cumulative_volume, current.close),
        };
    };

    if current.period_key != previous.period_key {
        return Detection::Rollover {
            event: positive_event(now, current.cumulative_volume, current.close),
            closed_period_volume: previous.cumulative_volume,
        };
    }

    let Some(delta) = current
        .cumulative_volume
        .delta_from(previous.cumulative_volume)
    else {
        // Not comparable; same handling as a decrease.
        return Detection::Anomaly {
            previous: previous.cumulative_volume,
            current: current.cumulative_volume,
        };
    };

    if delta.is_zero() {
        return Detection::Unchanged;
    }
    if delta.is_sign_negative() {
        return Detection::Anomaly {
            previous: previous.cumulative_volume,
            current: current.cumulative_volume,
        };
    }

    match positive_event(now, Volume::new(delta), current.close) {
        Some(event) => Detection::Growth { event },
        None => Detection::Unchanged,
    }
}

/// Stateful wrapper around [`detect`] that remembers the last snapshot.
#[derive(Debug, Default)]
pub struct DeltaVolumeDetector {
    previous: Option<PeriodSnapshot>,
    anomaly_count: u64,
}

impl DeltaVolumeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a snapshot observed at `now`.
    ///
    /// The stored snapshot is replaced by `current` on every call, whether or
    /// not an event was emitted.
    pub fn observe(&mut self, current: PeriodSnapshot, now: DateTime<Utc>) -> Detection {
        let detection = detect(self.previous.as_ref(), &current, now);

        match &detection {
            Detection::Anomaly { previous, current: cur } => {
                self.anomaly_count += 1;
                warn!(
                    period_key = current.period_key,
                    previous = %previous,
                    current = %cur,
                    anomalies = self.anomaly_count,
                    "Cumulative volume decreased within an unchanged period"
                );
            }
            Detection::Unchanged => {
                debug!(period_key = current.period_key, "No new volume");
            }
            Detection::Rollover {
                closed_period_volume,
                ..
            } => {
                let previous_key = self.previous.as_ref().map(|p| p.period_key);
                if previous_key.is_some_and(|key| current.period_key < key) {
                    warn!(
                        ?previous_key,
                        period_key = current.period_key,
                        "Period key moved backwards; treating as rollover"
                    );
                }
                debug!(
                    ?previous_key,
                    period_key = current.period_key,
                    closed_period_volume = %closed_period_volume,
                    "Period rolled over"
                );
            }
            Detection::Initial { .. } | Detection::Growth { .. } => {}
        }

        self.previous = Some(current);
        detection
    }

    /// Last snapshot seen.
    pub fn previous(&self) -> Option<&PeriodSnapshot> {
        self.previous.as_ref()
    }

    /// Number of same-period volume decreases seen so far.
    pub fn anomaly_count(&self) -> u64 {
        self.anomaly_count
    }
}
