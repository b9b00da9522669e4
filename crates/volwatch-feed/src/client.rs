//! HTTP client for the public chart endpoint.

use crate::error::{FeedError, FeedResult};
use crate::parser::latest_snapshot;
use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;
use volwatch_core::{Instrument, PeriodSnapshot};
use volwatch_telemetry::Metrics;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Candle interval requested from the API.
const CANDLE_INTERVAL: &str = "1m";

/// Something that can report the current period snapshot.
pub trait SnapshotSource {
    fn fetch_latest(&self) -> impl Future<Output = FeedResult<PeriodSnapshot>> + Send;
}

/// Polls `GET {base}/public/v2/chart/{quote}/{target}`.
pub struct CandleClient {
    client: Client,
    chart_url: String,
    size: u32,
}

impl CandleClient {
    /// Create a client for `instrument` against `base_url`
    /// (e.g. "https://api.coinone.co.kr").
    ///
    /// `size` is how many candles to request per poll.
    pub fn new(base_url: &str, instrument: &Instrument, size: u32) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            chart_url: chart_url(base_url, instrument),
            size: size.max(1),
        })
    }

    pub fn chart_url(&self) -> &str {
        &self.chart_url
    }

    async fn request(&self) -> FeedResult<PeriodSnapshot> {
        let size = self.size.to_string();
        let response = self
            .client
            .get(&self.chart_url)
            .query(&[("interval", CANDLE_INTERVAL), ("size", size.as_str())])
            .send()
            .await
            .map_err(|e| FeedError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Http(format!("Failed to read response body: {e}")))?;

        latest_snapshot(&body)
    }
}

impl SnapshotSource for CandleClient {
    async fn fetch_latest(&self) -> FeedResult<PeriodSnapshot> {
        let started = Instant::now();
        let result = self.request().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        Metrics::poll_latency(outcome, elapsed_ms);

        if let Ok(snapshot) = &result {
            debug!(
                period_key = snapshot.period_key,
                cumulative_volume = %snapshot.cumulative_volume,
                elapsed_ms,
                "Fetched candle"
            );
        }
        result
    }
}

fn chart_url(base_url: &str, instrument: &Instrument) -> String {
    format!(
        "{}/public/v2/chart/{}/{}",
        base_url.trim_end_matches('/'),
        instrument.quote,
        instrument.target
    )
}
