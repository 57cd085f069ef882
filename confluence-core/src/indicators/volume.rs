//! Volume participation.
//!
//! - relative_volume: last volume over the mean of the previous 20 bars,
//!   signed by the bar direction: `50 + dir · 50 · tanh(rvol − 1)`.
//! - volume_delta: rolling 20-bar sum of `volume · (close − open) / (high − low)`,
//!   z-scored against its own history.
//! - adl: Chaikin money flow over 20 bars, `50 + 50 · CMF`.
//! - mfi: Money Flow Index(14).
//! - obv: rolling 20-bar sum of `sign(Δclose) · volume`, z-scored.
//! - vwap: close minus VWAP(20), divided by ATR(14), tanh-mapped.

use crate::domain::{Bar, MarketWindow};
use crate::math::{ratio_score, safe_divide, tanh_score, EPSILON, NEUTRAL_SCORE};
use crate::result::{bias_label, IndicatorResult};
use crate::stats::RollingParams;
use crate::weights::ComponentWeights;

use super::{
    atr, per_atr, require_bars, rolling_sums, Indicator, IndicatorError, IndicatorKind,
    ScoreSheet, TrackerBank,
};

pub const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("relative_volume", 0.20),
    ("volume_delta", 0.25),
    ("adl", 0.15),
    ("mfi", 0.15),
    ("obv", 0.15),
    ("vwap", 0.10),
];

const LOOKBACK: usize = 20;
const MFI_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const MIN_BARS: usize = LOOKBACK + 1;

#[derive(Debug, Clone)]
pub struct VolumeIndicator {
    weights: ComponentWeights,
    trackers: TrackerBank,
}

impl VolumeIndicator {
    pub fn new(weights: ComponentWeights, rolling: RollingParams) -> Self {
        Self {
            weights,
            trackers: TrackerBank::new(rolling),
        }
    }
}

impl Indicator for VolumeIndicator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Volume
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
        let tf = window.timeframe();
        let scale = self.trackers.scale();
        // No traded volume in the trailing window: the flow sums are zero by
        // construction and say nothing about direction.
        let active = trailing_volume(bars, LOOKBACK).is_some();

        let delta_samples = rolling_sums(&bars.iter().map(bar_delta).collect::<Vec<_>>(), LOOKBACK);
        let delta = self.trackers.tracker(tf, "volume_delta");
        delta.ingest(bars.iter().map(|b| b.timestamp).zip(delta_samples));
        let delta_score = delta.latest_score(scale);

        let obv_samples = rolling_sums(&obv_steps(bars), LOOKBACK);
        let obv = self.trackers.tracker(tf, "obv");
        obv.ingest(bars.iter().map(|b| b.timestamp).zip(obv_samples));
        let obv_score = obv.latest_score(scale);

        let mut sheet = ScoreSheet::new(self.kind(), &self.weights);
        sheet.record("relative_volume", relative_volume(bars), |s| {
            format!("participation {}", bias_label(s))
        });
        sheet.record("volume_delta", active.then_some(delta_score), |s| {
            format!("buying pressure {}", bias_label(s))
        });
        sheet.record_score("adl", chaikin_money_flow(bars, LOOKBACK).map(ratio_score));
        sheet.record("mfi", money_flow_index(bars, MFI_PERIOD), |s| format!("MFI {s:.1}"));
        sheet.record_score("obv", active.then_some(obv_score));
        sheet.record_score(
            "vwap",
            vwap_deviation(bars, LOOKBACK)
                .and_then(|d| per_atr(d, atr(bars, ATR_PERIOD)))
                .map(tanh_score),
        );
        Ok(sheet.finish())
    }
}

/// Body-weighted volume of one bar; zero-range bars contribute nothing.
fn bar_delta(bar: &Bar) -> f64 {
    safe_divide(bar.volume * (bar.close - bar.open), bar.range(), 0.0)
}

fn obv_steps(bars: &[Bar]) -> Vec<f64> {
    let mut steps = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let change = bars[i].close - bars[i - 1].close;
        if change.is_finite() && change != 0.0 && bars[i].volume.is_finite() {
            steps[i] = change.signum() * bars[i].volume;
        }
    }
    steps
}

fn relative_volume(bars: &[Bar]) -> Option<f64> {
    let (last, previous) = bars.split_last()?;
    if previous.len() < LOOKBACK {
        return None;
    }
    let avg = previous[previous.len() - LOOKBACK..]
        .iter()
        .map(|b| b.volume)
        .sum::<f64>()
        / LOOKBACK as f64;
    if !avg.is_finite() || avg < EPSILON {
        return None;
    }
    let rvol = safe_divide(last.volume, avg, 1.0);
    Some(NEUTRAL_SCORE + last.direction() * 50.0 * (rvol - 1.0).tanh())
}

/// Volume of the trailing `period` bars, `None` when zero or unusable.
fn trailing_volume(bars: &[Bar], period: usize) -> Option<f64> {
    let recent = &bars[bars.len().saturating_sub(period)..];
    let total: f64 = recent.iter().map(|b| b.volume).sum();
    (total.is_finite() && total >= EPSILON).then_some(total)
}

/// `Σ mfv / Σ volume` over the trailing `period` bars, in `[-1, 1]`.
fn chaikin_money_flow(bars: &[Bar], period: usize) -> Option<f64> {
    let total_volume = trailing_volume(bars, period)?;
    let recent = &bars[bars.len().saturating_sub(period)..];
    let flow: f64 = recent
        .iter()
        .map(|b| {
            let multiplier = safe_divide((b.close - b.low) - (b.high - b.close), b.range(), 0.0);
            multiplier * b.volume
        })
        .sum();
    Some(safe_divide(flow, total_volume, 0.0))
}

fn money_flow_index(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }
    let recent = &bars[bars.len() - period - 1..];
    let (mut positive, mut negative) = (0.0, 0.0);
    for w in recent.windows(2) {
        let (prev_tp, tp) = (w[0].typical_price(), w[1].typical_price());
        let flow = tp * w[1].volume;
        if !flow.is_finite() || flow <= 0.0 {
            continue;
        }
        if tp > prev_tp {
            positive += flow;
        } else if tp < prev_tp {
            negative += flow;
        }
    }
    if positive + negative < EPSILON {
        return None;
    }
    Some(100.0 * positive / (positive + negative))
}

/// Last close minus the volume-weighted average price of the trailing window.
fn vwap_deviation(bars: &[Bar], period: usize) -> Option<f64> {
    let recent = &bars[bars.len().saturating_sub(period)..];
    let volume: f64 = recent.iter().map(|b| b.volume).sum();
    if !volume.is_finite() || volume < EPSILON {
        return None;
    }
    let vwap = recent.iter().map(|b| b.typical_price() * b.volume).sum::<f64>() / volume;
    let dev = recent.last()?.close - vwap;
    dev.is_finite().then_some(dev)
}
