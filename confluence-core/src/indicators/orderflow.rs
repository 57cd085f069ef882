//! Aggressor order flow from the trade tape.
//!
//! - cvd: rolling 50-trade sum of signed size, z-scored against its history.
//! - trade_flow: `(buy − sell) / (buy + sell)` over the tape; no activity → 50.
//! - imbalance: the same ratio with a recency decay (half-life 20 trades).
//! - large_trades: buy/sell imbalance among trades larger than mean + 2σ.

use crate::domain::{MarketWindow, Trade, TradeSide};
use crate::math::{imbalance, mean, ratio_score, std_dev, EPSILON};
use crate::result::{bias_label, IndicatorResult};
use crate::stats::RollingParams;
use crate::weights::ComponentWeights;

use super::{rolling_sums, Indicator, IndicatorError, IndicatorKind, ScoreSheet, TrackerBank};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("cvd", 0.35),
    ("trade_flow", 0.25),
    ("imbalance", 0.20),
    ("large_trades", 0.20),
];

const CVD_TRADES: usize = 50;
const DECAY_HALF_LIFE: f64 = 20.0;
const LARGE_TRADE_SIGMAS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct OrderflowIndicator {
    weights: ComponentWeights,
    trackers: TrackerBank,
}

impl OrderflowIndicator {
    pub fn new(weights: ComponentWeights, rolling: RollingParams) -> Self {
        Self {
            weights,
            trackers: TrackerBank::new(rolling),
        }
    }
}

impl Indicator for OrderflowIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Orderflow
    }

    fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    /// The tape drives this indicator, not the bars.
    fn min_bars(&self) -> usize {
        0
    }

    fn is_ready(&self, window: &MarketWindow) -> bool {
        window.trades().iter().any(Trade::is_valid)
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
        let trades: Vec<&Trade> = window.trades().iter().filter(|t| t.is_valid()).collect();
        if trades.is_empty() {
            return Err(IndicatorError::MissingData("trade tape"));
        }
        let scale = self.trackers.scale();

        let signed: Vec<f64> = trades.iter().map(|t| t.signed_size()).collect();
        let sums = rolling_sums(&signed, CVD_TRADES);
        let cvd = self.trackers.tracker(window.timeframe(), "cvd");
        cvd.ingest(last_per_timestamp(&trades, &sums));
        let cvd_score = cvd.latest_score(scale);

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record("cvd", Some(cvd_score), |s| {
            format!("cumulative delta {}", bias_label(s))
        });
        sheet.record("trade_flow", Some(trade_flow(&trades)), |s| {
            format!("aggressor flow {}", bias_label(s))
        });
        sheet.record_score("imbalance", decayed_imbalance(&trades));
        sheet.record("large_trades", large_trade_imbalance(&trades), |s| {
            format!("large prints {}", bias_label(s))
        });
        Ok(sheet.finish())
    }
}

/// One sample per distinct timestamp: the rolling sum after the last trade
/// carrying it.
fn last_per_timestamp(
    trades: &[&Trade],
    sums: &[f64],
) -> Vec<(chrono::DateTime<chrono::Utc>, f64)> {
    let mut out: Vec<(chrono::DateTime<chrono::Utc>, f64)> = Vec::with_capacity(trades.len());
    for (trade, &sum) in trades.iter().zip(sums) {
        match out.last_mut() {
            Some(last) if last.0 == trade.timestamp => last.1 = sum,
            _ => out.push((trade.timestamp, sum)),
        }
    }
    out
}

/// Buy vs sell aggressor volume. Zero activity scores exactly 50.
fn trade_flow(trades: &[&Trade]) -> f64 {
    let (buy, sell) = trades.iter().fold((0.0, 0.0), |(b, s), t| {
        if t.side == TradeSide::Buy {
            (b + t.size, s)
        } else {
            (b, s + t.size)
        }
    });
    ratio_score(imbalance(buy, sell))
}

fn decayed_imbalance(trades: &[&Trade]) -> Option<f64> {
    let lambda = std::f64::consts::LN_2 / DECAY_HALF_LIFE;
    let (signed, total) = trades
        .iter()
        .rev()
        .enumerate()
        .fold((0.0, 0.0), |(s, t), (age, trade)| {
            let w = (-lambda * age as f64).exp();
            (s + w * trade.signed_size(), t + w * trade.size)
        });
    if total < EPSILON {
        return None;
    }
    Some(ratio_score(signed / total))
}

fn large_trade_imbalance(trades: &[&Trade]) -> Option<f64> {
    let sizes: Vec<f64> = trades.iter().map(|t| t.size).collect();
    let sigma = std_dev(&sizes)?;
    if sigma < EPSILON {
        return None;
    }
    let threshold = mean(&sizes)? + LARGE_TRADE_SIGMAS * sigma;
    let (buy, sell) = trades
        .iter()
        .filter(|t| t.size > threshold)
        .fold((0.0, 0.0), |(b, s), t| {
            if t.side == TradeSide::Buy {
                (b + t.size, s)
            } else {
                (b, s + t.size)
            }
        });
    if buy + sell < EPSILON {
        return None;
    }
    Some(ratio_score(imbalance(buy, sell)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, make_window};
    use chrono::{Duration, TimeZone, Utc};

    fn trade(secs: i64, size: f64, side: TradeSide) -> Trade {
        Trade {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::seconds(secs),
            price: 100.0,
            size,
            side,
        }
    }

    fn indicator() -> OrderflowIndicator {
        OrderflowIndicator::new(
            IndicatorKind::Orderflow.default_weights().unwrap(),
            RollingParams::default(),
        )
    }

    #[test]
    fn zero_activity_is_exactly_neutral() {
        let tape = vec![trade(0, 0.0, TradeSide::Buy), trade(1, 0.0, TradeSide::Sell)];
        let refs: Vec<&Trade> = tape.iter().collect();
        assert_eq!(trade_flow(&refs), 50.0);
        assert_eq!(decayed_imbalance(&refs), None);
    }

    #[test]
    fn buy_dominated_tape_is_bullish() {
        let tape: Vec<Trade> = (0..60)
            .map(|i| {
                let side = if i % 4 == 0 { TradeSide::Sell } else { TradeSide::Buy };
                trade(i, 1.0, side)
            })
            .collect();
        let window = make_window(make_bars(&[100.0, 101.0])).with_trades(tape).unwrap();
        let mut ind = indicator();
        assert!(ind.is_ready(&window));
        let result = ind.compute(&window).unwrap();
        assert_approx(result.component("trade_flow").unwrap(), 75.0, 1e-9);
        assert!(result.component("imbalance").unwrap() > 50.0);
        assert!(result.score() > 50.0);
    }

    #[test]
    fn large_trades_follow_the_whales() {
        let mut tape: Vec<Trade> = (0..40).map(|i| trade(i, 1.0, TradeSide::Buy)).collect();
        tape.push(trade(41, 50.0, TradeSide::Sell));
        let refs: Vec<&Trade> = tape.iter().collect();
        assert_eq!(large_trade_imbalance(&refs), Some(0.0));
    }

    #[test]
    fn equal_timestamps_collapse_to_one_sample() {
        let tape = vec![
            trade(0, 1.0, TradeSide::Buy),
            trade(0, 2.0, TradeSide::Buy),
            trade(1, 1.0, TradeSide::Sell),
        ];
        let refs: Vec<&Trade> = tape.iter().collect();
        let sums = rolling_sums(&[1.0, 2.0, -1.0], CVD_TRADES);
        let samples = last_per_timestamp(&refs, &sums);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].1, 3.0);
        assert_eq!(samples[1].1, 2.0);
    }

    #[test]
    fn window_without_tape_is_not_ready() {
        let window = make_window(make_bars(&[100.0, 101.0]));
        let mut ind = indicator();
        assert!(!ind.is_ready(&window));
        assert_eq!(ind.evaluate(&window).score(), 50.0);
    }
}
