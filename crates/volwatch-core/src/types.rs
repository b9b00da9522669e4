//! Volume observation types.
//!
//! `PeriodSnapshot` is what a candle source reports; `TradeEvent` is what the
//! window aggregates. Both carry wall-clock timestamps as `DateTime<Utc>`.

use crate::error::{CoreError, Result};
use crate::{Price, Volume};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored market, e.g. CRO quoted in KRW.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Traded asset symbol (e.g., "CRO").
    pub target: String,
    /// Quote currency symbol (e.g., "KRW").
    pub quote: String,
}

impl Instrument {
    /// Create an instrument, normalising symbols to upper case.
    pub fn new(target: impl Into<String>, quote: impl Into<String>) -> Result<Self> {
        let target = target.into().trim().to_uppercase();
        let quote = quote.into().trim().to_uppercase();
        if target.is_empty() || quote.is_empty() {
            return Err(CoreError::InvalidInstrument(format!(
                "target={target:?} quote={quote:?}"
            )));
        }
        Ok(Self { target, quote })
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.quote)
    }
}

/// One unit of detected volume.
///
/// Immutable once constructed; `volume` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    occurred_at: DateTime<Utc>,
    volume: Volume,
    price: Option<Price>,
}

impl TradeEvent {
    /// Create a trade event.
    ///
    /// Returns `CoreError::NegativeVolume` if `volume < 0` and
    /// `CoreError::ImplausibleVolume` above [`Volume::MAX_PLAUSIBLE`].
    pub fn new(occurred_at: DateTime<Utc>, volume: Volume, price: Option<Price>) -> Result<Self> {
        if volume.is_negative() {
            return Err(CoreError::NegativeVolume(volume.to_string()));
        }
        if !volume.is_plausible() {
            return Err(CoreError::ImplausibleVolume(volume.to_string()));
        }
        Ok(Self {
            occurred_at,
            volume,
            price,
        })
    }

    /// Wall-clock time the volume was observed.
    #[inline]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Quote-currency volume of this event.
    #[inline]
    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Unit price at observation time (display only).
    #[inline]
    pub fn price(&self) -> Option<Price> {
        self.price
    }
}

/// Cumulative volume reported for one reporting period (one candle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSnapshot {
    /// Period identifier, monotonically non-decreasing (candle open time in ms).
    pub period_key: i64,
    /// Volume accrued within the period so far.
    pub cumulative_volume: Volume,
    /// Latest price in the period, if the source reports one.
    pub close: Option<Price>,
}

impl PeriodSnapshot {
    pub fn new(period_key: i64, cumulative_volume: Volume) -> Self {
        Self {
            period_key,
            cumulative_volume,
            close: None,
        }
    }

    pub fn with_close(mut self, close: Price) -> Self {
        self.close = Some(close);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instrument_normalises_case() {
        let instrument = Instrument::new(" cro ", "krw").unwrap();
        assert_eq!(instrument.target, "CRO");
        assert_eq!(instrument.quote, "KRW");
        assert_eq!(instrument.to_string(), "CRO/KRW");
    }

    #[test]
    fn test_instrument_rejects_empty() {
        assert!(Instrument::new("", "KRW").is_err());
        assert!(Instrument::new("CRO", "  ").is_err());
    }

    #[test]
    fn test_trade_event_rejects_negative_volume() {
        let result = TradeEvent::new(Utc::now(), Volume::new(dec!(-1)), None);
        assert!(matches!(result, Err(CoreError::NegativeVolume(_))));
    }

    #[test]
    fn test_trade_event_rejects_implausible_volume() {
        let result = TradeEvent::new(Utc::now(), Volume::new(dec!(50000000000000000000000000000)), None);
        assert!(matches!(result, Err(CoreError::ImplausibleVolume(_))));

        assert!(TradeEvent::new(Utc::now(), Volume::MAX_PLAUSIBLE, None).is_ok());
    }

    #[test]
    fn test_trade_event_accepts_zero() {
        let event = TradeEvent::new(Utc::now(), Volume::ZERO, Some(Price::new(dec!(130)))).unwrap();
        assert!(event.volume().is_zero());
        assert_eq!(event.price(), Some(Price::new(dec!(130))));
    }

    #[test]
    fn test_snapshot_with_close() {
        let snapshot = PeriodSnapshot::new(60_000, Volume::new(dec!(5))).with_close(Price::new(dec!(1)));
        assert_eq!(snapshot.close, Some(Price::new(dec!(1))));
    }
}
