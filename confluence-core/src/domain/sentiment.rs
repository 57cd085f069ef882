//! Derivatives sentiment feed values.

use serde::{Deserialize, Serialize};

/// Latest sentiment readings for a symbol. Every field is optional; a
/// missing reading scores neutral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentSnapshot {
    /// Perpetual funding rate per interval (0.0001 = 0.01%).
    pub funding_rate: Option<f64>,
    /// Long accounts divided by short accounts.
    pub long_short_ratio: Option<f64>,
    /// Notional of long positions liquidated over the feed's lookback.
    pub long_liquidations: Option<f64>,
    /// Notional of short positions liquidated over the feed's lookback.
    pub short_liquidations: Option<f64>,
    pub open_interest: Option<f64>,
    /// Open interest at the start of the feed's lookback.
    pub open_interest_prev: Option<f64>,
}

impl SentimentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.funding_rate.is_none()
            && self.long_short_ratio.is_none()
            && self.long_liquidations.is_none()
            && self.short_liquidations.is_none()
            && self.open_interest.is_none()
    }
}
