//! Keep-alive bookkeeping for the stream connection.
//!
//! The exchange expects an application-level `PING` at a fixed interval and
//! answers with `PONG`. A ping left unanswered past the timeout means the
//! connection is dead even if the socket is still open.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct HeartbeatState {
    last_ping: DateTime<Utc>,
    last_pong: Option<DateTime<Utc>>,
    waiting_for_pong: bool,
}

impl HeartbeatState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            last_ping: now,
            last_pong: None,
            waiting_for_pong: false,
        }
    }
}

pub struct HeartbeatManager {
    /// How often to send PING.
    interval_ms: u64,
    /// How long a PING may stay unanswered.
    timeout_ms: u64,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            state: RwLock::new(HeartbeatState::fresh(Utc::now())),
        }
    }

    /// Reset on a fresh connection. The first PING goes out one interval
    /// after this.
    pub fn reset(&self) {
        *self.state.write() = HeartbeatState::fresh(Utc::now());
    }

    pub fn record_ping(&self) {
        self.record_ping_at(Utc::now());
    }

    fn record_ping_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.write();
        state.last_ping = now;
        state.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        state.last_pong = Some(now);
        state.waiting_for_pong = false;
        debug!(
            rtt_ms = (now - state.last_ping).num_milliseconds(),
            "Received pong"
        );
    }

    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Utc::now())
    }

    fn is_timed_out_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        state.waiting_for_pong
            && (now - state.last_ping).num_milliseconds() > self.timeout_ms as i64
    }

    /// True once a full interval has passed since the last PING and no pong
    /// is outstanding.
    pub fn should_send_ping(&self) -> bool {
        self.should_send_ping_at(Utc::now())
    }

    fn should_send_ping_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        !state.waiting_for_pong
            && (now - state.last_ping).num_milliseconds() >= self.interval_ms as i64
    }

    /// Period at which the connection loop should check the heartbeat.
    pub fn check_period(&self) -> Duration {
        let period = self.interval_ms.min(self.timeout_ms.max(1)) / 2;
        Duration::from_millis(period.max(50))
    }

    pub fn last_pong(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_pong
    }
}
