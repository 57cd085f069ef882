//! Price structure: trend, swing pivots and where volume traded.
//!
//! - trend_position: MA(20)/MA(50) alignment plus close distance from MA(50)
//!   in ATRs.
//! - support_resistance: `d_res / (d_res + d_sup)` against the nearest swing
//!   pivots above and below the close. Room to run up scores high.
//! - swing_structure: higher highs and higher lows against lower highs and
//!   lower lows.
//! - volume_profile: close distance from the 24-bin point of control in ATRs.

use crate::domain::{Bar, MarketWindow};
use crate::math::{imbalance, ratio_score, sma, tanh_score, EPSILON};
use crate::result::{bias_label, IndicatorResult};
use crate::weights::ComponentWeights;

use super::{atr, per_atr, require_bars, Indicator, IndicatorError, IndicatorKind, ScoreSheet};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("trend_position", 0.30),
    ("support_resistance", 0.25),
    ("swing_structure", 0.25),
    ("volume_profile", 0.20),
];

const FAST_MA: usize = 20;
const SLOW_MA: usize = 50;
const ATR_PERIOD: usize = 14;
const PIVOT_SPAN: usize = 2;
const PROFILE_BINS: usize = 24;
const STRUCTURE_BARS: usize = 100;
const MIN_BARS: usize = SLOW_MA;

#[derive(Debug, Clone)]
pub struct PriceStructureIndicator {
    weights: ComponentWeights,
}

impl PriceStructureIndicator {
    pub fn new(weights: ComponentWeights) -> Self {
        Self { weights }
    }
}

impl Indicator for PriceStructureIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::PriceStructure
    }

    fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    fn min_bars(&self) -> usize {
        MIN_BARS
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
        require_bars(window, MIN_BARS)?;
        let all = window.bars();
        let bars = &all[all.len().saturating_sub(STRUCTURE_BARS)..];
        let atr = atr(all, ATR_PERIOD);
        let close = window.last_bar().map_or(f64::NAN, |b| b.close);
        let pivots = Pivots::find(bars);

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record("trend_position", trend_position(&window.closes(), atr), |s| {
            format!("trend {}", bias_label(s))
        });
        sheet.record(
            "support_resistance",
            support_resistance(close, &pivots),
            |s| {
                if s >= 50.0 {
                    "closer to support than resistance".to_string()
                } else {
                    "closer to resistance than support".to_string()
                }
            },
        );
        sheet.record_score("swing_structure", swing_structure(&pivots));
        sheet.record(
            "volume_profile",
            point_of_control(bars)
                .and_then(|poc| per_atr(close - poc, atr))
                .map(tanh_score),
            |s| {
                if s > 50.0 {
                    "trading above the point of control".to_string()
                } else if s < 50.0 {
                    "trading below the point of control".to_string()
                } else {
                    "at the point of control".to_string()
                }
            },
        );
        Ok(sheet.finish())
    }
}

/// Swing highs and lows in bar order.
#[derive(Debug, Default)]
struct Pivots {
    highs: Vec<f64>,
    lows: Vec<f64>,
}

impl Pivots {
    /// A bar is a pivot high when its high is strictly above the
    /// `PIVOT_SPAN` highs before it and not below the ones after it, so a
    /// flat top yields its first bar (pivot lows mirror this).
    fn find(bars: &[Bar]) -> Self {
        let mut pivots = Pivots::default();
        if bars.len() < 2 * PIVOT_SPAN + 1 {
            return pivots;
        }
        for i in PIVOT_SPAN..bars.len() - PIVOT_SPAN {
            let left = &bars[i - PIVOT_SPAN..i];
            let right = &bars[i + 1..=i + PIVOT_SPAN];
            let (h, l) = (bars[i].high, bars[i].low);
            if left.iter().all(|b| h > b.high) && right.iter().all(|b| h >= b.high) {
                pivots.highs.push(h);
            }
            if left.iter().all(|b| l < b.low) && right.iter().all(|b| l <= b.low) {
                pivots.lows.push(l);
            }
        }
        pivots
    }
}

fn trend_position(closes: &[f64], atr: Option<f64>) -> Option<f64> {
    let close = *closes.last()?;
    let fast = sma(closes, FAST_MA)?;
    let slow = sma(closes, SLOW_MA)?;
    let distance = per_atr(close - slow, atr)?;
    let alignment = if close > fast && fast > slow {
        1.0
    } else if close < fast && fast < slow {
        -1.0
    } else {
        0.0
    };
    Some(ratio_score(0.5 * alignment + 0.5 * (distance / 2.0).tanh()))
}

fn support_resistance(close: f64, pivots: &Pivots) -> Option<f64> {
    let resistance = pivots
        .highs
        .iter()
        .copied()
        .filter(|h| *h > close)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.min(h))))?;
    let support = pivots
        .lows
        .iter()
        .copied()
        .filter(|l| *l < close)
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.max(l))))?;
    let d_res = resistance - close;
    let d_sup = close - support;
    if d_res + d_sup < EPSILON {
        return None;
    }
    Some(100.0 * d_res / (d_res + d_sup))
}

fn swing_structure(pivots: &Pivots) -> Option<f64> {
    let count = |values: &[f64]| {
        values.windows(2).fold((0.0, 0.0), |(up, down), w| {
            if w[1] > w[0] {
                (up + 1.0, down)
            } else if w[1] < w[0] {
                (up, down + 1.0)
            } else {
                (up, down)
            }
        })
    };
    let (higher_highs, lower_highs) = count(pivots.highs.as_slice());
    let (higher_lows, lower_lows) = count(pivots.lows.as_slice());
    let bullish = higher_highs + higher_lows;
    let bearish = lower_highs + lower_lows;
    if bullish + bearish < EPSILON {
        return None;
    }
    Some(ratio_score(imbalance(bullish, bearish)))
}

/// Centre price of the most traded bin of the range.
fn point_of_control(bars: &[Bar]) -> Option<f64> {
    let lo = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let hi = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    if !range.is_finite() || range < EPSILON {
        return None;
    }
    let mut bins = [0.0_f64; PROFILE_BINS];
    for bar in bars {
        if !bar.volume.is_finite() || bar.volume <= 0.0 {
            continue;
        }
        let position = ((bar.typical_price() - lo) / range * PROFILE_BINS as f64).floor();
        if position.is_finite() {
            let idx = (position.max(0.0) as usize).min(PROFILE_BINS - 1);
            bins[idx] += bar.volume;
        }
    }
    let (idx, volume) = bins
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
    if volume < EPSILON {
        return None;
    }
    Some(lo + (idx as f64 + 0.5) * range / PROFILE_BINS as f64)
}
