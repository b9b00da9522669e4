//! Shared test fixtures.

#![allow(dead_code)]

pub mod mock_ws;

use parking_lot::Mutex;
use std::sync::Arc;
use volwatch_bot::{AlertSink, AppResult};
use volwatch_detector::AlertSignal;

/// Sink that keeps every signal it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    signals: Arc<Mutex<Vec<AlertSignal>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<AlertSignal> {
        self.signals.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.signals.lock().len()
    }
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&mut self, signal: &AlertSignal) -> AppResult<()> {
        self.signals.lock().push(signal.clone());
        Ok(())
    }
}
