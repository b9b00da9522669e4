//! Chart response parsing.
//!
//! ```json
//! {"result":"success","error_code":"0","chart":[
//!   {"timestamp":1700000040000,"open":"130","high":"132","low":"129",
//!    "close":"131","target_volume":"5000","quote_volume":"655000.5"}
//! ]}
//! ```
//!
//! Numeric fields usually arrive as strings; timestamps may be either.

use crate::error::{FeedError, FeedResult};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use volwatch_core::{PeriodSnapshot, Price, Volume};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self, field: &str) -> FeedResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| FeedError::Parse(format!("{field}: invalid integer {s:?}"))),
        }
    }
}

/// Candle entry as returned by the API.
#[derive(Debug, Clone, Deserialize)]
struct RawCandle {
    timestamp: Option<Scalar>,
    #[serde(default)]
    close: Option<String>,
    #[serde(default)]
    quote_volume: Option<String>,
}

impl RawCandle {
    fn period_key(&self) -> FeedResult<i64> {
        self.timestamp
            .as_ref()
            .ok_or_else(|| FeedError::Parse("candle without timestamp".to_string()))?
            .as_i64("timestamp")
    }

    fn into_snapshot(self) -> FeedResult<PeriodSnapshot> {
        let key = self.period_key()?;

        let raw_volume = self
            .quote_volume
            .ok_or_else(|| FeedError::Parse(format!("candle {key} without quote_volume")))?;
        let volume = Decimal::from_str(raw_volume.trim())
            .map_err(|e| FeedError::Parse(format!("quote_volume {raw_volume:?}: {e}")))?;
        let volume = Volume::new(volume);
        if volume.is_negative() {
            return Err(FeedError::Parse(format!(
                "candle {key} has negative quote_volume {volume}"
            )));
        }
        if !volume.is_plausible() {
            return Err(FeedError::Parse(format!(
                "candle {key} has implausible quote_volume {volume}"
            )));
        }

        let mut snapshot = PeriodSnapshot::new(key, volume);
        // Close is display-only; a bad value is dropped rather than failing the poll.
        if let Some(close) = self.close.and_then(|c| Price::from_str(c.trim()).ok()) {
            snapshot = snapshot.with_close(close);
        }
        Ok(snapshot)
    }
}

/// Chart endpoint response body.
#[derive(Debug, Clone, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    error_code: Option<Scalar>,
    #[serde(default)]
    chart: Vec<RawCandle>,
}

impl ChartResponse {
    fn check(&self) -> FeedResult<()> {
        let code = match &self.error_code {
            Some(Scalar::Int(v)) => v.to_string(),
            Some(Scalar::Text(s)) => s.clone(),
            None => "0".to_string(),
        };
        if self.result != "success" || code != "0" {
            return Err(FeedError::Api {
                result: self.result.clone(),
                code,
            });
        }
        Ok(())
    }
}

/// Reduce a chart body to the snapshot of its newest candle.
///
/// The API does not guarantee ordering, so the candle with the largest
/// timestamp wins.
pub fn latest_snapshot(body: &str) -> FeedResult<PeriodSnapshot> {
    let response: ChartResponse = serde_json::from_str(body)?;
    response.check()?;

    let mut latest: Option<(i64, RawCandle)> = None;
    for candle in response.chart {
        let key = candle.period_key()?;
        if latest.as_ref().map_or(true, |(best, _)| key > *best) {
            latest = Some((key, candle));
        }
    }

    latest.ok_or(FeedError::Empty)?.1.into_snapshot()
}
