//! WebSocket trade stream client for volwatch.
//!
//! - Subscribes one instrument's TRADE channel
//! - Application-level PING keep-alive with pong timeout detection
//! - Fixed-delay reconnection and resubscription
//! - Parsed messages forwarded on an mpsc channel

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;
pub use message::{parse_inbound, CandleData, Inbound, StreamMessage, Topic, TradeTick, WsRequest};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the rustls ring provider.
///
/// Call once before opening `wss://` connections. Later calls are no-ops.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
