//! Stream connection manager.
//!
//! Connects, subscribes, keeps the connection alive with PING frames and
//! reconnects after a fixed delay until shut down. Parsed market data is
//! forwarded on an mpsc channel; the receiver owns all downstream state, so
//! reconnects never touch it.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{parse_inbound, Inbound, StreamMessage, Topic, WsRequest};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use volwatch_core::Instrument;
use volwatch_telemetry::Metrics;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Instrument whose channel is subscribed.
    pub instrument: Instrument,
    /// Channel name (e.g. "TRADE").
    pub channel: String,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay_ms: u64,
    /// PING interval.
    pub keepalive_interval_ms: u64,
    /// PONG must arrive within this after a PING.
    pub pong_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>, instrument: Instrument) -> Self {
        Self {
            url: url.into(),
            instrument,
            channel: "TRADE".to_string(),
            max_reconnect_attempts: 0,
            reconnect_delay_ms: 5_000,
            keepalive_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    heartbeat: HeartbeatManager,
    message_tx: mpsc::Sender<StreamMessage>,
    reconnect_count: RwLock<u32>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a connection manager that stops when `shutdown_token` is
    /// cancelled.
    pub fn new(
        config: ConnectionConfig,
        message_tx: mpsc::Sender<StreamMessage>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let heartbeat =
            HeartbeatManager::new(config.keepalive_interval_ms, config.pong_timeout_ms);
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            heartbeat,
            message_tx,
            reconnect_count: RwLock::new(0),
            shutdown_token,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed connections since the last successful one.
    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Request shutdown. The current connection is closed with a Close frame
    /// and no reconnect is attempted.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run until shutdown or until the reconnect limit is hit.
    pub async fn run(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("Stream connection ended");
                    "ended"
                }
                Err(e) => {
                    error!(error = %e, "Stream connection error");
                    e.reason()
                }
            };
            Metrics::ws_disconnected();

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            // Reset to zero by every successful connect.
            let attempt = {
                let mut count = self.reconnect_count.write();
                *count += 1;
                *count
            };

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnectionState::Disconnected;
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;
            Metrics::ws_reconnect(reason);

            let delay = self.reconnect_delay();
            warn!(attempt, reason, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to stream");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        *self.reconnect_count.write() = 0;
        Metrics::ws_connected();
        info!("Stream connected");

        let subscribe = WsRequest::subscribe(
            self.config.channel.clone(),
            Topic::from(&self.config.instrument),
        );
        write
            .send(Message::Text(serde_json::to_string(&subscribe)?))
            .await?;
        info!(
            channel = %self.config.channel,
            instrument = %self.config.instrument,
            "Subscription sent"
        );

        self.heartbeat.reset();
        let period = self.heartbeat.check_period();
        let mut heartbeat_check =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text_message(&text).await {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            warn!("Stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = heartbeat_check.tick() => {
                    if self.heartbeat.is_timed_out() {
                        error!(
                            timeout_ms = self.config.pong_timeout_ms,
                            "Pong not received in time"
                        );
                        return Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_ping() {
                        let ping = serde_json::to_string(&WsRequest::ping())?;
                        write.send(Message::Text(ping)).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent keep-alive ping");
                    }
                }
            }
        }
    }

    /// Handle one text frame. Returns false once the receiver is gone.
    async fn handle_text_message(&self, text: &str) -> bool {

        let inbound = match parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, frame = %text, "Dropping unparseable frame");
                return true;
            }
        };

        match inbound {
            Inbound::Pong => {
                self.heartbeat.record_pong();
                true
            }
            Inbound::Subscribed(channel) => {
                info!(%channel, "Subscription acknowledged");
                true
            }
            Inbound::Error(message) => {
                warn!(%message, "Stream error response");
                true
            }
            Inbound::Ignored(kind) => {
                debug!(%kind, "Ignoring frame");
                true
            }
            Inbound::Data(message) => {
                if self.message_tx.send(message).await.is_err() {
                    warn!("Message receiver dropped, stopping stream");
                    self.shutdown_token.cancel();
                    return false;
                }
                true
            }
        }
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.config.reconnect_delay_ms)
    }
}
