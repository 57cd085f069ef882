//! Timeframe blending shared by every indicator.
//!
//! An indicator scores each timeframe window on its own. The blender runs it
//! over every window that is ready, drops the rest, renormalizes the
//! [`TimeframeWeights`] over what remains and blends the overall score and
//! each component. Nothing here returns an error: a window that fails or an
//! indicator with no usable timeframe contributes the neutral result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{FrameSet, Timeframe};
use crate::fingerprint::canonical_digest;
use crate::indicators::{Indicator, IndicatorKind};
use crate::math::NEUTRAL_SCORE;
use crate::result::{bias_label, IndicatorResult, OVERALL};
use crate::weights::{weighted_mean, TimeframeWeights};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeframeBlender {
    weights: TimeframeWeights,
}

impl TimeframeBlender {
    pub fn new(weights: TimeframeWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &TimeframeWeights {
        &self.weights
    }

    /// Evaluate `indicator` on every ready timeframe of `frames` and blend.
    pub fn blend(&self, indicator: &mut dyn Indicator, frames: &FrameSet) -> IndicatorResult {
        let kind = indicator.kind();
        let mut evaluated: Vec<(Timeframe, IndicatorResult)> = Vec::with_capacity(frames.len());
        for (timeframe, window) in frames.iter() {
            if indicator.is_ready(window) {
                evaluated.push((timeframe, indicator.evaluate(window)));
            } else {
                debug!(
                    indicator = %kind,
                    symbol = frames.symbol(),
                    timeframe = %timeframe,
                    bars = window.len(),
                    min_bars = indicator.min_bars(),
                    "timeframe excluded: insufficient data"
                );
            }
        }
        self.combine(kind, evaluated)
    }

    /// Blend already evaluated per-timeframe results.
    pub fn combine(
        &self,
        kind: IndicatorKind,
        evaluated: Vec<(Timeframe, IndicatorResult)>,
    ) -> IndicatorResult {
        let present: Vec<Timeframe> = evaluated.iter().map(|(tf, _)| *tf).collect();
        let Some(weights) = self.weights.renormalized(&present) else {
            debug!(indicator = %kind, "no timeframe with sufficient data");
            return IndicatorResult::neutral("no timeframe with sufficient data");
        };
        let weight_of = |tf: &Timeframe| weights.get(tf).copied().unwrap_or(0.0);

        let score = weighted_mean(evaluated.iter().map(|(tf, r)| (weight_of(tf), r.score())))
            .unwrap_or(NEUTRAL_SCORE);

        let names: BTreeSet<&String> = evaluated
            .iter()
            .flat_map(|(_, r)| r.components().keys())
            .collect();
        let components: BTreeMap<String, f64> = names
            .into_iter()
            .map(|name| {
                let blended = weighted_mean(
                    evaluated
                        .iter()
                        .filter_map(|(tf, r)| r.component(name).map(|s| (weight_of(tf), s))),
                )
                .unwrap_or(NEUTRAL_SCORE);
                (name.clone(), blended)
            })
            .collect();

        // Interpretations come from the heaviest timeframe; ties go to the
        // more recent one.
        let dominant = evaluated.iter().fold(None, |best: Option<&(Timeframe, IndicatorResult)>, entry| {
            match best {
                Some(b) if weight_of(&b.0) >= weight_of(&entry.0) => Some(b),
                _ => Some(entry),
            }
        });
        let mut interpretation = dominant
            .map(|(_, r)| r.interpretation().clone())
            .unwrap_or_default();
        let names: Vec<&str> = present.iter().map(|tf| tf.name()).collect();
        interpretation.insert(
            OVERALL.to_string(),
            format!("{} ({score:.1}) across {}", bias_label(score), names.join(", ")),
        );

        IndicatorResult::new(score, components, interpretation)
    }
}

// ── Cache key ────────────────────────────────────────────────────────

/// Cache identity of one blended indicator result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorCacheKey {
    pub symbol: String,
    /// Sorted, deduplicated.
    pub timeframes: Vec<Timeframe>,
    pub indicator: IndicatorKind,
}

impl IndicatorCacheKey {
    pub fn new(
        symbol: impl Into<String>,
        timeframes: impl IntoIterator<Item = Timeframe>,
        indicator: IndicatorKind,
    ) -> Self {
        let timeframes: BTreeSet<Timeframe> = timeframes.into_iter().collect();
        Self {
            symbol: symbol.into(),
            timeframes: timeframes.into_iter().collect(),
            indicator,
        }
    }

    pub fn for_frames(frames: &FrameSet, indicator: IndicatorKind) -> Self {
        Self::new(frames.symbol(), frames.timeframes(), indicator)
    }

    pub fn hash(&self) -> String {
        use serde_json::json;

        let timeframes: Vec<&str> = self.timeframes.iter().map(|tf| tf.name()).collect();
        let canonical = json!({
            "indicator": self.indicator.name(),
            "symbol": &self.symbol,
            "timeframes": timeframes,
        });
        canonical_digest(&canonical)
    }
}

impl fmt::Display for IndicatorCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timeframes: Vec<&str> = self.timeframes.iter().map(|tf| tf.name()).collect();
        write!(f, "{}:{}:{}", self.symbol, self.indicator, timeframes.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketWindow;
    use crate::indicators::{assert_approx, build_indicator, make_bars, IndicatorError};
    use crate::stats::RollingParams;
    use crate::weights::ComponentWeights;

    /// Scores every window by its timeframe, for checking the blend.
    struct FixedIndicator {
        weights: ComponentWeights,
        by_timeframe: BTreeMap<Timeframe, f64>,
    }

    impl Indicator for FixedIndicator {
        fn kind(&self) -> IndicatorKind {
            IndicatorKind::Technical
        }

        fn weights(&self) -> &ComponentWeights {
            &self.weights
        }

        fn min_bars(&self) -> usize {
            3
        }

        fn compute(&mut self, window: &MarketWindow) -> Result<IndicatorResult, IndicatorError> {
            let score = self.by_timeframe[&window.timeframe()];
            let mut components = BTreeMap::new();
            components.insert("only".to_string(), score);
            let mut interpretation = BTreeMap::new();
            interpretation.insert("only".to_string(), window.timeframe().to_string());
            Ok(IndicatorResult::new(score, components, interpretation))
        }
    }

    fn fixed(scores: &[(Timeframe, f64)]) -> FixedIndicator {
        FixedIndicator {
            weights: ComponentWeights::new([("only", 1.0)]).unwrap(),
            by_timeframe: scores.iter().copied().collect(),
        }
    }

    fn frames(spec: &[(Timeframe, usize)]) -> FrameSet {
        let windows = spec.iter().map(|(tf, n)| {
            let closes: Vec<f64> = (0..*n).map(|i| 100.0 + i as f64).collect();
            MarketWindow::new("BTCUSDT", *tf, make_bars(&closes)).unwrap()
        });
        FrameSet::from_windows(windows).unwrap()
    }

    #[test]
    fn blends_with_default_weights() {
        let blender = TimeframeBlender::default();
        let mut ind = fixed(&[
            (Timeframe::Base, 80.0),
            (Timeframe::Short, 60.0),
            (Timeframe::Medium, 40.0),
            (Timeframe::Long, 20.0),
        ]);
        let set = frames(&[
            (Timeframe::Base, 5),
            (Timeframe::Short, 5),
            (Timeframe::Medium, 5),
            (Timeframe::Long, 5),
        ]);
        let result = blender.blend(&mut ind, &set);
        // 0.4·80 + 0.3·60 + 0.2·40 + 0.1·20
        assert_approx(result.score(), 60.0, 1e-9);
        assert_approx(result.component("only").unwrap(), 60.0, 1e-9);
        assert_eq!(result.interpretation()["only"], "base");
    }

    #[test]
    fn short_timeframes_are_excluded_and_weights_renormalized() {
        let blender = TimeframeBlender::default();
        let mut ind = fixed(&[(Timeframe::Base, 80.0), (Timeframe::Long, 20.0)]);
        let set = frames(&[(Timeframe::Base, 2), (Timeframe::Long, 5)]);
        let result = blender.blend(&mut ind, &set);
        assert_approx(result.score(), 20.0, 1e-9);
        assert!(result.interpretation()[OVERALL].contains("long"));
    }

    #[test]
    fn nothing_ready_is_neutral() {
        let blender = TimeframeBlender::default();
        let mut ind = build_indicator(
            IndicatorKind::Orderflow,
            IndicatorKind::Orderflow.default_weights().unwrap(),
            RollingParams::default(),
        );
        let set = frames(&[(Timeframe::Base, 60)]);
        let result = blender.blend(ind.as_mut(), &set);
        assert_eq!(result.score(), 50.0);
        assert!(result.components().is_empty());
    }

    #[test]
    fn cache_key_is_order_independent() {
        let a = IndicatorCacheKey::new("BTCUSDT", [Timeframe::Long, Timeframe::Base], IndicatorKind::Volume);
        let b = IndicatorCacheKey::new(
            "BTCUSDT",
            [Timeframe::Base, Timeframe::Long, Timeframe::Base],
            IndicatorKind::Volume,
        );
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.to_string(), "BTCUSDT:volume:base,long");
        let c = IndicatorCacheKey::new("BTCUSDT", [Timeframe::Base], IndicatorKind::Volume);
        assert_ne!(a.hash(), c.hash());
    }
}
