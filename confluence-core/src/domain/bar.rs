//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol on a single timeframe.
///
/// Volume is fractional (crypto contracts trade in fractions of a unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// `high - low`.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// `(high + low) / 2`.
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// +1 for an up bar, -1 for a down bar, 0 for a doji or void bar.
    pub fn direction(&self) -> f64 {
        let body = self.close - self.open;
        if body.is_finite() && body != 0.0 {
            body.signum()
        } else {
            0.0
        }
    }
}
