//! Candle snapshot source for volwatch.
//!
//! Polls the public chart endpoint and reduces the response to the latest
//! [`volwatch_core::PeriodSnapshot`].

pub mod client;
pub mod error;
pub mod parser;

pub use client::{CandleClient, SnapshotSource};
pub use error::{FeedError, FeedResult};
pub use parser::latest_snapshot;
