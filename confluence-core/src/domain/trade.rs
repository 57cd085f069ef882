//! Trade tape entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggressor side of a print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn sign(self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

/// A single print from the trade tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
}

impl Trade {
    /// Size signed by aggressor side; 0.0 for unusable prints.
    pub fn signed_size(&self) -> f64 {
        if self.is_valid() {
            self.side.sign() * self.size
        } else {
            0.0
        }
    }

    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.size.is_finite() && self.size >= 0.0
    }
}
