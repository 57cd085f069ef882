//! Confluence aggregation across the six indicators.
//!
//! Each indicator score is turned into a signed deviation
//! `d = (s − 50) / 50` in `[-1, 1]`. Then:
//!
//! ```text
//! weighted_sum = Σ wᵢ·dᵢ
//! score_raw    = clip(weighted_sum·50 + 50)
//! variance     = Var(d₁..d₆)            (population)
//! consensus    = exp(−2·variance)
//! confidence   = |weighted_sum|·consensus
//! ```
//!
//! Indicators missing from the input count as neutral (`d = 0`).

use std::collections::BTreeMap;

use crate::indicators::IndicatorKind;
use crate::math::{clip_score, clip_to_range, NEUTRAL_SCORE};
use crate::quality;
use crate::result::{ConfluenceResult, IndicatorResult};
use crate::weights::{ComponentWeights, WeightError};

pub const DEFAULT_CONFLUENCE_WEIGHTS: &[(&str, f64)] = &[
    ("orderflow", 0.25),
    ("orderbook", 0.25),
    ("volume", 0.16),
    ("price_structure", 0.16),
    ("technical", 0.11),
    ("sentiment", 0.07),
];

/// Pre-adjustment aggregate of the indicator scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub weighted_sum: f64,
    pub score_raw: f64,
    pub variance: f64,
    pub consensus: f64,
    pub confidence: f64,
}

/// `(score − 50) / 50`, clamped to `[-1, 1]`.
pub fn deviation(score: f64) -> f64 {
    clip_to_range((clip_score(score) - NEUTRAL_SCORE) / NEUTRAL_SCORE, -1.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfluenceAggregator {
    weights: ComponentWeights,
}

impl ConfluenceAggregator {
    /// `weights` is keyed by indicator name.
    pub fn new(weights: ComponentWeights) -> Self {
        Self { weights }
    }

    pub fn with_default_weights() -> Result<Self, WeightError> {
        Ok(Self::new(default_confluence_weights()?))
    }

    pub fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    pub fn aggregate(&self, components: &BTreeMap<IndicatorKind, IndicatorResult>) -> Aggregate {
        let deviations: Vec<(IndicatorKind, f64)> = IndicatorKind::ALL
            .iter()
            .map(|kind| {
                let d = components.get(kind).map_or(0.0, |r| deviation(r.score()));
                (*kind, d)
            })
            .collect();

        let weighted_sum: f64 = deviations
            .iter()
            .map(|(kind, d)| self.weights.get(kind.name()) * d)
            .sum();
        let weighted_sum = clip_to_range(weighted_sum, -1.0, 1.0);

        let n = deviations.len() as f64;
        let mean = deviations.iter().map(|(_, d)| d).sum::<f64>() / n;
        let variance = deviations.iter().map(|(_, d)| (d - mean).powi(2)).sum::<f64>() / n;
        let consensus = (-2.0 * variance).exp();

        Aggregate {
            weighted_sum,
            score_raw: clip_score(weighted_sum * 50.0 + NEUTRAL_SCORE),
            variance,
            consensus,
            confidence: weighted_sum.abs() * consensus,
        }
    }

    /// Aggregate, apply the quality adjustment and assemble the result.
    pub fn finalize(&self, components: BTreeMap<IndicatorKind, IndicatorResult>) -> ConfluenceResult {
        let aggregate = self.aggregate(&components);
        let adjusted = quality::adjust(aggregate.score_raw, aggregate.confidence);
        ConfluenceResult::new(
            aggregate.score_raw,
            adjusted.score,
            aggregate.consensus,
            aggregate.confidence,
            aggregate.variance,
            components,
        )
    }
}

pub fn default_confluence_weights() -> Result<ComponentWeights, WeightError> {
    ComponentWeights::new(DEFAULT_CONFLUENCE_WEIGHTS.iter().copied())
}
