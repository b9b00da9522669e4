//! Hysteresis latch over a breach predicate.
//!
//! ```text
//! Normal  --breach-->     Alerted   (emit once)
//! Alerted --breach-->     Alerted   (silent)
//! Alerted --no breach-->  Normal    (re-arm)
//! Normal  --no breach-->  Normal
//! ```

use crate::predicate::BreachPredicate;
use serde::Serialize;
use std::fmt;
use volwatch_core::Volume;

/// Latch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Normal,
    Alerted,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Alerted => write!(f, "alerted"),
        }
    }
}

/// A Normal → Alerted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breach {
    pub sum: Volume,
    /// Rule that fired.
    pub rule: &'static str,
}

pub struct AlertStateMachine {
    predicate: Box<dyn BreachPredicate>,
    state: AlertState,
}

impl AlertStateMachine {
    pub fn new(predicate: Box<dyn BreachPredicate>) -> Self {
        Self {
            predicate,
            state: AlertState::Normal,
        }
    }

    /// Evaluate the current window sum.
    ///
    /// Returns `Some` only on the Normal → Alerted transition. Must be called
    /// with a sum taken after eviction.
    pub fn evaluate(&mut self, sum: Volume) -> Option<Breach> {
        let fired = self.predicate.breached_rule(sum);

        match (self.state, fired) {
            (AlertState::Normal, Some(rule)) => {
                self.state = AlertState::Alerted;
                Some(Breach { sum, rule })
            }
            (AlertState::Alerted, None) => {
                self.state = AlertState::Normal;
                None
            }
            _ => None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_alerted(&self) -> bool {
        self.state == AlertState::Alerted
    }

    /// Name of the configured rule.
    pub fn rule(&self) -> &'static str {
        self.predicate.rule()
    }

    /// Forward a closed period's volume to the predicate.
    pub fn record_closed_period(&mut self, volume: Volume) {
        self.predicate.record_closed_period(volume);
    }
}

impl fmt::Debug for AlertStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertStateMachine")
            .field("rule", &self.predicate.rule())
            .field("state", &self.state)
            .finish()
    }
}
