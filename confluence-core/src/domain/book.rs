//! Order book snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.size.is_finite() && self.size >= 0.0
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Point-in-time depth on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    /// Valid bids, best (highest) first, truncated to `depth` levels.
    pub fn top_bids(&self, depth: usize) -> Vec<BookLevel> {
        let mut bids: Vec<BookLevel> = self.bids.iter().copied().filter(BookLevel::is_valid).collect();
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        bids.truncate(depth);
        bids
    }

    /// Valid asks, best (lowest) first, truncated to `depth` levels.
    pub fn top_asks(&self, depth: usize) -> Vec<BookLevel> {
        let mut asks: Vec<BookLevel> = self.asks.iter().copied().filter(BookLevel::is_valid).collect();
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        asks.truncate(depth);
        asks
    }

    /// Best bid and best ask, if both sides have a valid level.
    pub fn best_bid_ask(&self) -> Option<(BookLevel, BookLevel)> {
        let bid = self.top_bids(1).into_iter().next()?;
        let ask = self.top_asks(1).into_iter().next()?;
        Some((bid, ask))
    }
}
