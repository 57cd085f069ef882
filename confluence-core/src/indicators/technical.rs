//! Technical momentum: RSI, MACD, Awesome Oscillator, Williams %R, CCI.
//!
//! - rsi: Wilder RSI(14), used directly as the score. No movement → 50.
//! - macd: MACD(12, 26, 9) histogram divided by ATR(14), tanh-mapped.
//! - ao: SMA(5) − SMA(34) of the median price divided by ATR(14), tanh-mapped.
//! - williams_r: `(close − LL) / (HH − LL) · 100` over 14 bars.
//! - cci: CCI(20) mapped as `50 + CCI / 4`.

use crate::domain::{Bar, MarketWindow};
use crate::math::{ema_series, safe_divide, sma, tanh_score, EPSILON, NEUTRAL_SCORE};
use crate::result::{bias_label, IndicatorResult};
use crate::weights::ComponentWeights;

use super::{atr, per_atr, require_bars, Indicator, IndicatorError, IndicatorKind, ScoreSheet};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("rsi", 0.25),
    ("macd", 0.20),
    ("ao", 0.20),
    ("williams_r", 0.15),
    ("cci", 0.20),
];

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const AO_FAST: usize = 5;
const AO_SLOW: usize = 34;
const WILLIAMS_PERIOD: usize = 14;
const CCI_PERIOD: usize = 20;
const ATR_PERIOD: usize = 14;

/// Bars needed before every component can produce a value.
const MIN_BARS: usize = MACD_SLOW + MACD_SIGNAL;

#[derive(Debug, Clone)]
pub struct TechnicalIndicator {
    weights: ComponentWeights,
}

impl TechnicalIndicator {
    pub fn new(weights: ComponentWeights) -> Self {
        Self { weights }
    }
}

impl Indicator for TechnicalIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Technical
    }

    fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    fn min_bars(&self) -> usize {
        MIN_BARS
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
        require_bars(window, MIN_BARS)?;
        let bars = window.bars();
        let closes = window.closes();
        let atr = atr(bars, ATR_PERIOD);

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record("rsi", wilder_rsi(&closes, RSI_PERIOD), |s| {
            if s >= 70.0 {
                format!("RSI {s:.1}, overbought momentum")
            } else if s <= 30.0 {
                format!("RSI {s:.1}, oversold momentum")
            } else {
                format!("RSI {s:.1}, {}", bias_label(s))
            }
        });
        sheet.record_score(
            "macd",
            macd_histogram(&closes).and_then(|h| per_atr(h, atr)).map(tanh_score),
        );
        sheet.record_score(
            "ao",
            awesome_oscillator(bars).and_then(|v| per_atr(v, atr)).map(tanh_score),
        );
        sheet.record("williams_r", williams_position(bars, WILLIAMS_PERIOD), |s| {
            format!("close at {s:.0}% of the {WILLIAMS_PERIOD}-bar range")
        });
        sheet.record_score("cci", cci(bars, CCI_PERIOD).map(|c| NEUTRAL_SCORE + c / 4.0));
        Ok(sheet.finish())
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss < EPSILON && avg_gain < EPSILON {
        NEUTRAL_SCORE // no movement
    } else if avg_loss < EPSILON {
        100.0
    } else if avg_gain < EPSILON {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Wilder RSI of the last close.
pub(crate) fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    if changes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = -changes[..period].iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;
    let alpha = 1.0 / period as f64;
    for &ch in &changes[period..] {
        avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
    }
    Some(compute_rsi(avg_gain, avg_loss))
}

/// Last MACD histogram value (MACD line minus its signal line).
fn macd_histogram(closes: &[f64]) -> Option<f64> {
    let fast = ema_series(closes, MACD_FAST);
    let slow = ema_series(closes, MACD_SLOW);
    let line: Vec<f64> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| f - s)
        .filter(|v| v.is_finite())
        .collect();
    let signal = ema_series(&line, MACD_SIGNAL);
    let hist = line.last()? - signal.last()?;
    hist.is_finite().then_some(hist)
}

fn awesome_oscillator(bars: &[Bar]) -> Option<f64> {
    let medians: Vec<f64> = bars.iter().map(Bar::median_price).collect();
    Some(sma(&medians, AO_FAST)? - sma(&medians, AO_SLOW)?)
}

/// Williams %R rescaled to `[0, 100]`: where the close sits in the range.
fn williams_position(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period {
        return None;
    }
    let recent = &bars[bars.len() - period..];
    let hh = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let ll = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let close = recent.last()?.close;
    let range = hh - ll;
    if !range.is_finite() || range < EPSILON {
        return None;
    }
    Some((close - ll) / range * 100.0)
}

/// Commodity Channel Index of the last bar.
fn cci(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period {
        return None;
    }
    let tp: Vec<f64> = bars[bars.len() - period..].iter().map(Bar::typical_price).collect();
    let mean = tp.iter().sum::<f64>() / period as f64;
    let mean_dev = tp.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
    if mean_dev < EPSILON {
        return None;
    }
    let value = safe_divide(tp.last()? - mean, 0.015 * mean_dev, f64::NAN);
    value.is_finite().then_some(value)
}
