//! Core domain types for the volwatch volume monitor.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Instrument`: the monitored market (target/quote currency pair)
//! - `Price`, `Qty`, `Volume`: precision-safe numeric types
//! - `TradeEvent`: one unit of detected volume with its observation time
//! - `PeriodSnapshot`: a cumulative per-period candle reading

pub mod decimal;
pub mod error;
pub mod types;

pub use decimal::{Price, Qty, Volume};
pub use error::{CoreError, Result};
pub use types::{Instrument, PeriodSnapshot, TradeEvent};
