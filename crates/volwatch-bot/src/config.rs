//! Application configuration.
//!
//! Loaded from TOML, then overridden by `VOLWATCH_*` environment variables,
//! then validated before anything starts.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use volwatch_core::Instrument;
use volwatch_detector::DetectorConfig;
use volwatch_ws::ConnectionConfig;

/// Default config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Data source mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Poll REST candles and derive volume from cumulative snapshots.
    #[default]
    Poll,
    /// Subscribe to the trade stream.
    Stream,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "stream" => Ok(Self::Stream),
            other => Err(format!("unknown mode {other:?} (expected poll or stream)")),
        }
    }
}

/// Monitored market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Traded asset symbol.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Quote currency.
    #[serde(default = "default_quote")]
    pub quote: String,
}

fn default_symbol() -> String {
    "CRO".to_string()
}

fn default_quote() -> String {
    "KRW".to_string()
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            quote: default_quote(),
        }
    }
}

/// REST polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Poll interval (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Candles requested per poll.
    #[serde(default = "default_candle_size")]
    pub candle_size: u32,
}

fn default_rest_url() -> String {
    "https://api.coinone.co.kr".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_candle_size() -> u32 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            interval_ms: default_poll_interval_ms(),
            candle_size: default_candle_size(),
        }
    }
}

/// Trade stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// PING interval (ms).
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// How long a PING may go unanswered (ms).
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    /// Fixed delay before reconnecting (ms).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Window eviction tick while no trades arrive (ms).
    #[serde(default = "default_eviction_tick_ms")]
    pub eviction_tick_ms: u64,
    /// Capacity of the socket → monitor channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_ws_url() -> String {
    "wss://stream.coinone.co.kr".to_string()
}

fn default_keepalive_interval_ms() -> u64 {
    30_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_eviction_tick_ms() -> u64 {
    1_000
}

fn default_channel_capacity() -> usize {
    1_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            eviction_tick_ms: default_eviction_tick_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Console alarm settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Print the banner and ring the bell on alert.
    #[serde(default = "default_alarm_enabled")]
    pub enabled: bool,
    /// Terminal bells per alert.
    #[serde(default = "default_bell_count")]
    pub bell_count: u32,
}

fn default_alarm_enabled() -> bool {
    true
}

fn default_bell_count() -> u32 {
    3
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enabled: default_alarm_enabled(),
            bell_count: default_bell_count(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Period of the info-level metrics report. 0 disables it.
    #[serde(default = "default_metrics_log_interval_ms")]
    pub metrics_log_interval_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_log_interval_ms() -> u64 {
    60_000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_log_interval_ms: default_metrics_log_interval_ms(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `config/default.toml` is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply `VOLWATCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> AppResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(symbol) = lookup("VOLWATCH_SYMBOL") {
            self.instrument.symbol = symbol;
        }
        if let Some(raw) = lookup("VOLWATCH_THRESHOLD") {
            self.detector.threshold = Decimal::from_str(raw.trim()).map_err(|e| {
                AppError::Config(format!("VOLWATCH_THRESHOLD {raw:?}: {e}"))
            })?;
        }
        if let Some(raw) = lookup("VOLWATCH_WINDOW_MS") {
            self.detector.window_ms = raw.trim().parse().map_err(|e| {
                AppError::Config(format!("VOLWATCH_WINDOW_MS {raw:?}: {e}"))
            })?;
        }
        if let Some(raw) = lookup("VOLWATCH_MODE") {
            self.mode = raw.parse().map_err(AppError::Config)?;
        }
        if let Some(url) = lookup("VOLWATCH_REST_URL") {
            self.poll.rest_url = url;
        }
        if let Some(url) = lookup("VOLWATCH_WS_URL") {
            self.stream.ws_url = url;
        }
        Ok(())
    }

    /// Validate configuration values. Any error here is fatal at startup.
    pub fn validate(&self) -> AppResult<()> {
        self.instrument()?;
        self.detector.validate().map_err(AppError::Config)?;

        match self.mode {
            Mode::Poll => {
                if self.poll.rest_url.trim().is_empty() {
                    return Err(AppError::Config("poll.rest_url must be set".to_string()));
                }
                if self.poll.interval_ms == 0 {
                    return Err(AppError::Config("poll.interval_ms must be positive".to_string()));
                }
                if self.poll.candle_size == 0 {
                    return Err(AppError::Config("poll.candle_size must be positive".to_string()));
                }
            }
            Mode::Stream => {
                let stream = &self.stream;
                if stream.ws_url.trim().is_empty() {
                    return Err(AppError::Config("stream.ws_url must be set".to_string()));
                }
                if stream.keepalive_interval_ms == 0
                    || stream.pong_timeout_ms == 0
                    || stream.eviction_tick_ms == 0
                {
                    return Err(AppError::Config(
                        "stream keepalive, pong timeout and eviction tick must be positive"
                            .to_string(),
                    ));
                }
                if stream.channel_capacity == 0 {
                    return Err(AppError::Config(
                        "stream.channel_capacity must be positive".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// The configured instrument. Fails on empty symbols.
    pub fn instrument(&self) -> AppResult<Instrument> {
        Instrument::new(&self.instrument.symbol, &self.instrument.quote)
            .map_err(|e| AppError::Config(format!("instrument: {e}")))
    }

    /// Stream connection settings for `instrument`.
    pub fn connection_config(&self, instrument: Instrument) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.stream.ws_url.clone(), instrument);
        config.max_reconnect_attempts = self.stream.max_reconnect_attempts;
        config.reconnect_delay_ms = self.stream.reconnect_delay_ms;
        config.keepalive_interval_ms = self.stream.keepalive_interval_ms;
        config.pong_timeout_ms = self.stream.pong_timeout_ms;
        config
    }
}
