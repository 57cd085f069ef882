//! The six confluence indicators.
//!
//! Every indicator implements [`Indicator`]: it scores one [`MarketWindow`]
//! (a single symbol and timeframe) into an [`IndicatorResult`] whose
//! components are mixed by the indicator's [`ComponentWeights`]. The
//! framework module blends those per-timeframe results.
//!
//! Sub-components that cannot produce a number (not enough bars, no volume,
//! zero range) score the neutral 50.0. Cumulative components keep a
//! [`FlowTracker`] per timeframe inside the indicator instance, which is why
//! `compute` takes `&mut self`.

pub mod orderbook;
pub mod orderflow;
pub mod price_structure;
pub mod sentiment;
pub mod technical;
pub mod volume;

pub use orderbook::OrderbookIndicator;
pub use orderflow::OrderflowIndicator;
pub use price_structure::PriceStructureIndicator;
pub use sentiment::SentimentIndicator;
pub use technical::TechnicalIndicator;
pub use volume::VolumeIndicator;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Bar, MarketWindow, Timeframe};
use crate::math::{clip_score, safe_divide, true_range, EPSILON, NEUTRAL_SCORE};
use crate::result::{bias_label, IndicatorResult};
use crate::stats::{FlowTracker, RollingParams};
use crate::weights::{weighted_mean, ComponentWeights, WeightError};

// ── Kinds ────────────────────────────────────────────────────────────

/// The closed set of indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Technical,
    Volume,
    Orderflow,
    Orderbook,
    PriceStructure,
    Sentiment,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Technical,
        IndicatorKind::Volume,
        IndicatorKind::Orderflow,
        IndicatorKind::Orderbook,
        IndicatorKind::PriceStructure,
        IndicatorKind::Sentiment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::Technical => "technical",
            IndicatorKind::Volume => "volume",
            IndicatorKind::Orderflow => "orderflow",
            IndicatorKind::Orderbook => "orderbook",
            IndicatorKind::PriceStructure => "price_structure",
            IndicatorKind::Sentiment => "sentiment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        IndicatorKind::ALL.into_iter().find(|k| k.name() == s)
    }

    /// Default component weights, before normalization.
    pub fn default_components(self) -> &'static [(&'static str, f64)] {
        match self {
            IndicatorKind::Technical => technical::DEFAULT_COMPONENTS,
            IndicatorKind::Volume => volume::DEFAULT_COMPONENTS,
            IndicatorKind::Orderflow => orderflow::DEFAULT_COMPONENTS,
            IndicatorKind::Orderbook => orderbook::DEFAULT_COMPONENTS,
            IndicatorKind::PriceStructure => price_structure::DEFAULT_COMPONENTS,
            IndicatorKind::Sentiment => sentiment::DEFAULT_COMPONENTS,
        }
    }

    pub fn component_names(self) -> Vec<&'static str> {
        self.default_components().iter().map(|(n, _)| *n).collect()
    }

    pub fn default_weights(self) -> Result<ComponentWeights, WeightError> {
        ComponentWeights::new(self.default_components().iter().copied())
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Trait ────────────────────────────────────────────────────────────

/// Internal indicator failures. Never escapes [`Indicator::evaluate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("needs {needed} bars, window has {available}")]
    InsufficientBars { needed: usize, available: usize },
    #[error("window carries no {0}")]
    MissingData(&'static str),
}

/// A confluence indicator.
///
/// Instances are owned by one symbol's engine and hold that symbol's rolling
/// state. `Send` so an engine can fan indicators out across threads.
pub trait Indicator: Send {
    fn kind(&self) -> IndicatorKind;

    fn weights(&self) -> &ComponentWeights;

    /// Minimum bars for a meaningful score.
    fn min_bars(&self) -> usize;

    /// Whether `window` carries enough data to take part in the blend.
    fn is_ready(&self, window: &MarketWindow) -> bool {
        window.len() >= self.min_bars()
    }

    fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError>;

    /// [`Indicator::compute`] with failures converted to the neutral result.
    fn evaluate(&mut self, window: &MarketWindow) -> IndicatorResult {
        match self.compute(window) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    indicator = %self.kind(),
                    symbol = window.symbol(),
                    timeframe = %window.timeframe(),
                    error = %err,
                    "indicator failed, scoring neutral"
                );
                IndicatorResult::neutral(err.to_string())
            }
        }
    }
}

/// Build the indicator for `kind`.
pub fn build_indicator(
    kind: IndicatorKind,
    weights: ComponentWeights,
    rolling: RollingParams,
) -> Box<dyn Indicator> {
    match kind {
        IndicatorKind::Technical => Box::new(TechnicalIndicator::new(weights)),
        IndicatorKind::Volume => Box::new(VolumeIndicator::new(weights, rolling)),
        IndicatorKind::Orderflow => Box::new(OrderflowIndicator::new(weights, rolling)),
        IndicatorKind::Orderbook => Box::new(OrderbookIndicator::new(weights, rolling)),
        IndicatorKind::PriceStructure => Box::new(PriceStructureIndicator::new(weights)),
        IndicatorKind::Sentiment => Box::new(SentimentIndicator::new(weights)),
    }
}

pub(crate) fn require_bars(window: &MarketWindow, needed: usize) -> Result<(), IndicatorError> {
    if window.len() < needed {
        return Err(IndicatorError::InsufficientBars {
            needed,
            available: window.len(),
        });
    }
    Ok(())
}

// ── Score sheet ──────────────────────────────────────────────────────

/// Collects component scores for one window and mixes them.
pub(crate) struct ScoreSheet<'a> {
    kind: IndicatorKind,
    weights: &'a ComponentWeights,
    components: BTreeMap<String, f64>,
    interpretation: BTreeMap<String, String>,
}

impl<'a> ScoreSheet<'a> {
    pub(crate) fn new(kind: IndicatorKind, weights: &'a ComponentWeights) -> Self {
        Self {
            kind,
            weights,
            components: BTreeMap::new(),
            interpretation: BTreeMap::new(),
        }
    }

    /// Record a component, clipped to `[0, 100]`. `None` (or a non-finite
    /// score) records the neutral score with an "insufficient data" note.
    pub(crate) fn record(&mut self, name: &str, score: Option<f64>, note: impl FnOnce(f64) -> String) {
        match score.filter(|s| s.is_finite()).map(clip_score) {
            Some(score) => {
                self.components.insert(name.to_string(), score);
                self.interpretation.insert(name.to_string(), note(score));
            }
            None => {
                debug!(indicator = %self.kind, component = name, "insufficient data, scoring neutral");
                self.components.insert(name.to_string(), NEUTRAL_SCORE);
                self.interpretation
                    .insert(name.to_string(), "insufficient data".to_string());
            }
        }
    }

    /// Record a component with the generic bias label as its note.
    pub(crate) fn record_score(&mut self, name: &str, score: Option<f64>) {
        self.record(name, score, |s| bias_label(s).to_string());
    }

    /// `Σ wᵢ·sᵢ / Σ wᵢ` over the recorded components.
    pub(crate) fn finish(self) -> IndicatorResult {
        let weights = self.weights;
        let score = weighted_mean(
            self.components
                .iter()
                .map(|(name, score)| (weights.get(name), *score)),
        )
        .unwrap_or(NEUTRAL_SCORE);
        IndicatorResult::new(score, self.components, self.interpretation)
    }
}

// ── Rolling state ────────────────────────────────────────────────────

/// One [`FlowTracker`] per `(timeframe, component)`.
#[derive(Debug, Clone)]
pub(crate) struct TrackerBank {
    params: RollingParams,
    trackers: BTreeMap<(Timeframe, &'static str), FlowTracker>,
}

impl TrackerBank {
    pub(crate) fn new(params: RollingParams) -> Self {
        Self {
            params,
            trackers: BTreeMap::new(),
        }
    }

    pub(crate) fn tracker(&mut self, timeframe: Timeframe, component: &'static str) -> &mut FlowTracker {
        let params = self.params;
        self.trackers
            .entry((timeframe, component))
            .or_insert_with(|| FlowTracker::new(&params))
    }

    pub(crate) fn scale(&self) -> f64 {
        self.params.zscore_scale
    }
}

// ── Shared series helpers ────────────────────────────────────────────

/// Trailing rolling sums of `values` over `period`; the first entries cover
/// however many values exist so far.
pub(crate) fn rolling_sums(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if period > 0 && i >= period {
            sum -= values[i - period];
        }
        out.push(sum);
    }
    out
}

/// Wilder-smoothed average true range of the trailing window, `None` with
/// fewer than `period + 1` bars.
pub(crate) fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let tr: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(w[1].high, w[1].low, w[0].close))
        .collect();
    let mut value = tr[..period].iter().sum::<f64>() / period as f64;
    let alpha = 1.0 / period as f64;
    for &t in &tr[period..] {
        value = alpha * t + (1.0 - alpha) * value;
    }
    value.is_finite().then_some(value)
}

/// `x / atr`, `None` when the ATR is unusable.
pub(crate) fn per_atr(x: f64, atr: Option<f64>) -> Option<f64> {
    let atr = atr.filter(|a| *a >= EPSILON)?;
    let ratio = safe_divide(x, atr, f64::NAN);
    ratio.is_finite().then_some(ratio)
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open, close) +
/// 1.0, low = min(open, close) - 1.0, volume = 1000, one minute apart.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let start = chrono::DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: start + chrono::Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Flat bars: every price equal, zero volume.
#[cfg(test)]
pub fn make_flat_bars(n: usize, price: f64) -> Vec<Bar> {
    make_bars(&vec![price; n])
        .into_iter()
        .map(|b| Bar {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            ..b
        })
        .collect()
}

#[cfg(test)]
pub fn make_window(bars: Vec<Bar>) -> MarketWindow {
    MarketWindow::new("TEST", Timeframe::Base, bars).unwrap()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}
