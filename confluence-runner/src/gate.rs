//! Alert gating: map a confluence score to an action.
//!
//! The gate reads the quality-adjusted `score`, so low-confidence readings
//! that were pulled toward 50 stay neutral.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use confluence_core::ConfluenceResult;

pub const DEFAULT_LONG_THRESHOLD: f64 = 68.0;
pub const DEFAULT_SHORT_THRESHOLD: f64 = 35.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Long,
    Short,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    #[error("gate threshold {name} = {value} is outside [0, 100]")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("short threshold ({short}) must be below long threshold ({long})")]
    Inverted { short: f64, long: f64 },
}

/// `[gate]` thresholds. Scores at or above `long_threshold` are long; at
/// or below `short_threshold` short; anything between neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalGate {
    pub long_threshold: f64,
    pub short_threshold: f64,
}

impl Default for SignalGate {
    fn default() -> Self {
        Self {
            long_threshold: DEFAULT_LONG_THRESHOLD,
            short_threshold: DEFAULT_SHORT_THRESHOLD,
        }
    }
}

impl SignalGate {
    pub fn new(long_threshold: f64, short_threshold: f64) -> Result<Self, GateError> {
        let gate = Self {
            long_threshold,
            short_threshold,
        };
        gate.validate()?;
        Ok(gate)
    }

    pub fn validate(&self) -> Result<(), GateError> {
        for (name, value) in [
            ("long_threshold", self.long_threshold),
            ("short_threshold", self.short_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(GateError::OutOfRange { name, value });
            }
        }
        if self.short_threshold >= self.long_threshold {
            return Err(GateError::Inverted {
                short: self.short_threshold,
                long: self.long_threshold,
            });
        }
        Ok(())
    }

    pub fn decide_score(&self, score: f64) -> GateDecision {
        if score >= self.long_threshold {
            GateDecision::Long
        } else if score <= self.short_threshold {
            GateDecision::Short
        } else {
            // NaN lands here too.
            GateDecision::Neutral
        }
    }

    pub fn decide(&self, result: &ConfluenceResult) -> GateDecision {
        self.decide_score(result.score())
    }
}
