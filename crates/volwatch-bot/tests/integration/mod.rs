//! Integration tests for volwatch-bot.
//!
//! These tests drive the orchestrators end to end:
//! - Stream connection lifecycle against a mock server
//! - Polling against a scripted candle source

pub mod common;
