//! Candle source errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: result={result}, error_code={code}")]
    Api { result: String, code: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No candles in response")]
    Empty,
}

impl FeedError {
    /// Metric label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Api { .. } => "api",
            Self::Parse(_) => "parse",
            Self::Empty => "empty",
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
