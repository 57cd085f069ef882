//! Derivatives positioning, read contrarian.
//!
//! - funding_rate: `50 − 50 · tanh(f / 0.001)`; crowded longs pay, bearish.
//! - long_short_ratio: `50 − 50 · tanh(ln r)`.
//! - liquidations: `50 + 50 · (short − long) / (short + long)`.
//! - open_interest: OI change signed by the last bar's price direction.
//!   Rising OI confirms the move.

use crate::domain::MarketWindow;
use crate::math::{imbalance, ratio_score, safe_divide, safe_log, EPSILON, NEUTRAL_SCORE};
use crate::result::{bias_label, IndicatorResult};
use crate::weights::ComponentWeights;

use super::{Indicator, IndicatorError, IndicatorKind, ScoreSheet};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("funding_rate", 0.30),
    ("long_short_ratio", 0.30),
    ("liquidations", 0.20),
    ("open_interest", 0.20),
];

/// Funding rate treated as one unit of crowding (0.1% per interval).
const FUNDING_UNIT: f64 = 0.001;
/// Relative OI change treated as one unit (5%).
const OI_CHANGE_UNIT: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SentimentIndicator {
    weights: ComponentWeights,
}

impl SentimentIndicator {
    pub fn new(weights: ComponentWeights) -> Self {
        Self { weights }
    }
}

impl Indicator for SentimentIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sentiment
    }

    fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    fn min_bars(&self) -> usize {
        0
    }

    fn is_ready(&self, window: &MarketWindow) -> bool {
        window.sentiment().is_some_and(|s| !s.is_empty())
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
        let feed = window
            .sentiment()
            .ok_or(IndicatorError::MissingData("sentiment snapshot"))?;

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record(
            "funding_rate",
            feed.funding_rate.filter(|f| f.is_finite()).map(funding_score),
            |s| {
                if s < NEUTRAL_SCORE {
                    "longs paying funding, crowded long".to_string()
                } else if s > NEUTRAL_SCORE {
                    "shorts paying funding, crowded short".to_string()
                } else {
                    "funding flat".to_string()
                }
            },
        );
        sheet.record_score(
            "long_short_ratio",
            feed.long_short_ratio.and_then(long_short_score),
        );
        sheet.record(
            "liquidations",
            liquidation_score(feed.long_liquidations, feed.short_liquidations),
            |s| format!("liquidations {}", bias_label(s)),
        );
        let direction = price_direction(window);
        sheet.record_score(
            "open_interest",
            open_interest_score(feed.open_interest, feed.open_interest_prev, direction),
        );
        Ok(sheet.finish())
    }
}

fn funding_score(rate: f64) -> f64 {
    NEUTRAL_SCORE - 50.0 * (rate / FUNDING_UNIT).tanh()
}

fn long_short_score(ratio: f64) -> Option<f64> {
    let log_ratio = safe_log(ratio, f64::NAN);
    log_ratio
        .is_finite()
        .then(|| NEUTRAL_SCORE - 50.0 * log_ratio.tanh())
}

/// Shorts being liquidated is a squeeze, bullish.
fn liquidation_score(long: Option<f64>, short: Option<f64>) -> Option<f64> {
    let long = long.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0);
    let short = short.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0);
    if long + short < EPSILON {
        return None;
    }
    Some(ratio_score(imbalance(short, long)))
}

/// Direction of the last bar close-to-close, 0.0 without two bars.
fn price_direction(window: &MarketWindow) -> f64 {
    match window.bars() {
        [.., prev, last] => {
            let change = last.close - prev.close;
            if change.is_finite() && change != 0.0 {
                change.signum()
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn open_interest_score(current: Option<f64>, previous: Option<f64>, direction: f64) -> Option<f64> {
    let (current, previous) = (current?, previous?);
    if !current.is_finite() || !previous.is_finite() || previous <= 0.0 {
        return None;
    }
    let change = safe_divide(current - previous, previous, 0.0);
    Some(NEUTRAL_SCORE + direction * 50.0 * (change / OI_CHANGE_UNIT).tanh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SentimentSnapshot;
    use crate::indicators::{assert_approx, make_bars, make_window};

    fn indicator() -> SentimentIndicator {
        SentimentIndicator::new(IndicatorKind::Sentiment.default_weights().unwrap())
    }

    #[test]
    fn funding_is_contrarian() {
        assert_eq!(funding_score(0.0), 50.0);
        assert!(funding_score(0.002) < 5.0);
        assert!(funding_score(-0.002) > 95.0);
    }

    #[test]
    fn balanced_ratio_is_neutral() {
        assert_eq!(long_short_score(1.0), Some(50.0));
        assert_eq!(long_short_score(0.0), None);
        assert_eq!(long_short_score(-2.0), None);
        assert!(long_short_score(3.0).unwrap() < 50.0);
    }

    #[test]
    fn short_squeeze_is_bullish() {
        assert_eq!(liquidation_score(Some(0.0), Some(100.0)), Some(100.0));
        assert_eq!(liquidation_score(None, None), None);
        assert_eq!(liquidation_score(Some(0.0), Some(0.0)), None);
    }

    #[test]
    fn open_interest_follows_price() {
        let up = make_window(make_bars(&[100.0, 101.0]));
        let down = make_window(make_bars(&[101.0, 100.0]));
        let rising = open_interest_score(Some(110.0), Some(100.0), price_direction(&up)).unwrap();
        let falling = open_interest_score(Some(110.0), Some(100.0), price_direction(&down)).unwrap();
        assert!(rising > 50.0);
        assert_approx(rising + falling, 100.0, 1e-9);
        assert_eq!(open_interest_score(Some(110.0), Some(0.0), 1.0), None);
    }

    #[test]
    fn empty_feed_is_not_ready() {
        let window = make_window(make_bars(&[100.0])).with_sentiment(SentimentSnapshot::default());
        let mut ind = indicator();
        assert!(!ind.is_ready(&window));
        let result = ind.compute(&window).unwrap();
        assert_eq!(result.score(), 50.0);
    }

    #[test]
    fn full_feed_scores_every_component() {
        let feed = SentimentSnapshot {
            funding_rate: Some(-0.0005),
            long_short_ratio: Some(0.8),
            long_liquidations: Some(10.0),
            short_liquidations: Some(30.0),
            open_interest: Some(105.0),
            open_interest_prev: Some(100.0),
        };
        let window = make_window(make_bars(&[100.0, 102.0])).with_sentiment(feed);
        let result = indicator().compute(&window).unwrap();
        assert_eq!(result.components().len(), 4);
        for (name, score) in result.components() {
            assert!(*score > 50.0, "{name} = {score}");
        }
    }
}
