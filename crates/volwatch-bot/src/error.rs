//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] volwatch_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] volwatch_feed::FeedError),

    #[error("Detector error: {0}")]
    Detector(#[from] volwatch_detector::DetectorError),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

pub type AppResult<T> = Result<T, AppError>;
