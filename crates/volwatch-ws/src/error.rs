//! Stream client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Pong timeout")]
    HeartbeatTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Reconnect reason label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectionClosed { .. } => "closed",
            Self::HeartbeatTimeout => "heartbeat",
            Self::ConnectionFailed(_) | Self::Tungstenite(_) => "transport",
            Self::ParseError(_) | Self::Json(_) => "protocol",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        let closed = WsError::ConnectionClosed {
            code: 1000,
            reason: "bye".to_string(),
        };
        assert_eq!(closed.reason(), "closed");
        assert_eq!(WsError::HeartbeatTimeout.reason(), "heartbeat");
        assert_eq!(WsError::ConnectionFailed("x".into()).reason(), "transport");
    }
}
