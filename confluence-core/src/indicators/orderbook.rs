//! Resting liquidity from the order book snapshot (top 10 levels).
//!
//! - imbalance: order imbalance ratio `OIR = (b − a) / (b + a)` of resting
//!   size, `50 + 50 · OIR`.
//! - depth: depth imbalance `DI = tanh((Σ p·v_bid − Σ p·v_ask) / (total_volume + ε))`,
//!   `50 + 50 · DI`.
//! - microprice: size-weighted microprice minus mid, over the half spread.
//! - top_of_book: size imbalance at the best bid and ask.
//! - imbalance_trend: OIR z-scored against its own history.

use crate::domain::{BookLevel, MarketWindow, OrderBookSnapshot};
use crate::math::{imbalance, ratio_score, safe_divide, EPSILON, NEUTRAL_SCORE};
use crate::result::{bias_label, IndicatorResult};
use crate::stats::RollingParams;
use crate::weights::ComponentWeights;

use super::{Indicator, IndicatorError, IndicatorKind, ScoreSheet, TrackerBank};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("imbalance", 0.30),
    ("depth", 0.25),
    ("microprice", 0.15),
    ("top_of_book", 0.15),
    ("imbalance_trend", 0.15),
];

/// Levels per side considered.
pub const BOOK_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct OrderbookIndicator {
    weights: ComponentWeights,
    trackers: TrackerBank,
}

impl OrderbookIndicator {
    pub fn new(weights: ComponentWeights, rolling: RollingParams) -> Self {
        Self {
            weights,
            trackers: TrackerBank::new(rolling),
        }
    }
}

impl Indicator for OrderbookIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Orderbook
    }

    fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    fn min_bars(&self) -> usize {
        0
    }

    fn is_ready(&self, window: &MarketWindow) -> bool {
        window.orderbook().is_some_and(|b| b.best_bid_ask().is_some())
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
        let book = window
            .orderbook()
            .ok_or(IndicatorError::MissingData("order book snapshot"))?;
        let bids = book.top_bids(BOOK_DEPTH);
        let asks = book.top_asks(BOOK_DEPTH);
        if bids.is_empty() || asks.is_empty() {
            return Err(IndicatorError::MissingData("two-sided order book"));
        }

        let oir = order_imbalance_ratio(&bids, &asks);
        let scale = self.trackers.scale();
        let trend = self.trackers.tracker(window.timeframe(), "imbalance_trend");
        if let Some(oir) = oir {
            trend.ingest([(book.timestamp, oir)]);
        }
        let trend_score = trend.latest_score(scale);

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record("imbalance", oir.map(ratio_score), |s| {
            format!("resting size {}", bias_label(s))
        });
        sheet.record_score("depth", depth_imbalance(&bids, &asks).map(ratio_score));
        sheet.record_score("microprice", microprice_offset(book).map(ratio_score));
        sheet.record_score("top_of_book", top_of_book_imbalance(book).map(ratio_score));
        sheet.record("imbalance_trend", Some(trend_score), |s| {
            if s == NEUTRAL_SCORE {
                "imbalance steady".to_string()
            } else {
                format!("imbalance drifting {}", bias_label(s))
            }
        });
        Ok(sheet.finish())
    }
}

/// OIR of resting size; `None` for an empty book.
pub(crate) fn order_imbalance_ratio(bids: &[BookLevel], asks: &[BookLevel]) -> Option<f64> {
    let bid_size: f64 = bids.iter().map(|l| l.size).sum();
    let ask_size: f64 = asks.iter().map(|l| l.size).sum();
    if bid_size + ask_size < EPSILON {
        return None;
    }
    Some(imbalance(bid_size, ask_size))
}

/// DI in `(-1, 1)`: notional difference over total resting size.
pub(crate) fn depth_imbalance(bids: &[BookLevel], asks: &[BookLevel]) -> Option<f64> {
    let bid_notional: f64 = bids.iter().map(BookLevel::notional).sum();
    let ask_notional: f64 = asks.iter().map(BookLevel::notional).sum();
    let total_volume: f64 = bids.iter().chain(asks).map(|l| l.size).sum();
    let di = ((bid_notional - ask_notional) / (total_volume + EPSILON)).tanh();
    di.is_finite().then_some(di)
}

/// `(microprice − mid) / half_spread`, in `[-1, 1]`. Locked or crossed books
/// have no usable spread.
fn microprice_offset(book: &OrderBookSnapshot) -> Option<f64> {
    let (bid, ask) = book.best_bid_ask()?;
    let half_spread = (ask.price - bid.price) / 2.0;
    if half_spread < EPSILON {
        return None;
    }
    let size = bid.size + ask.size;
    if size < EPSILON {
        return None;
    }
    let micro = (bid.price * ask.size + ask.price * bid.size) / size;
    let mid = (bid.price + ask.price) / 2.0;
    let offset = safe_divide(micro - mid, half_spread, f64::NAN);
    offset.is_finite().then_some(offset)
}

fn top_of_book_imbalance(book: &OrderBookSnapshot) -> Option<f64> {
    let (bid, ask) = book.best_bid_ask()?;
    if bid.size + ask.size < EPSILON {
        return None;
    }
    Some(imbalance(bid.size, ask.size))
}
