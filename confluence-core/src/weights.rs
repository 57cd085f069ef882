//! Validated weight sets.
//!
//! Weights are normalized to sum to 1.0 when constructed. A weight set that
//! cannot be normalized (sum at or below [`WEIGHT_EPSILON`]) is a
//! configuration error and fails construction; it is never silently
//! defaulted at the use site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Timeframe;

/// Sums at or below this are rejected.
pub const WEIGHT_EPSILON: f64 = 1e-10;

/// Tolerance for the normalized sum.
pub const SUM_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("weight set is empty")]
    Empty,
    #[error("weights sum to {0:e}, which cannot be normalized")]
    ZeroSum(f64),
    #[error("weight for '{name}' is negative ({value})")]
    Negative { name: String, value: f64 },
    #[error("weight for '{name}' is not finite")]
    NonFinite { name: String },
    #[error("unknown component '{name}' (expected one of: {expected})")]
    UnknownComponent { name: String, expected: String },
}

fn check_weight(name: &str, value: f64) -> Result<(), WeightError> {
    if !value.is_finite() {
        return Err(WeightError::NonFinite { name: name.to_string() });
    }
    if value < 0.0 {
        return Err(WeightError::Negative {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

/// Component name → weight, normalized to sum 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentWeights {
    weights: BTreeMap<String, f64>,
}

impl ComponentWeights {
    pub fn new<I, S>(entries: I) -> Result<Self, WeightError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (name, value) in entries {
            let name = name.into();
            check_weight(&name, value)?;
            weights.insert(name, value);
        }
        if weights.is_empty() {
            return Err(WeightError::Empty);
        }
        let sum: f64 = weights.values().sum();
        if sum <= WEIGHT_EPSILON {
            return Err(WeightError::ZeroSum(sum));
        }
        for value in weights.values_mut() {
            *value /= sum;
        }
        Ok(Self { weights })
    }

    /// Like [`ComponentWeights::new`] but every name must be in `known`.
    pub fn for_components<I, S>(entries: I, known: &[&str]) -> Result<Self, WeightError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = Self::new(entries)?;
        if let Some(name) = weights.weights.keys().find(|n| !known.contains(&n.as_str())) {
            return Err(WeightError::UnknownComponent {
                name: name.clone(),
                expected: known.join(", "),
            });
        }
        Ok(weights)
    }

    /// Weight for `name`, 0.0 if absent.
    pub fn get(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

impl<'de> Deserialize<'de> for ComponentWeights {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
        ComponentWeights::new(raw).map_err(serde::de::Error::custom)
    }
}

/// `Σ wᵢ · sᵢ / Σ wᵢ` over `(weight, score)` pairs, or `None` when the
/// included weights sum to at most [`WEIGHT_EPSILON`].
pub fn weighted_mean<I>(pairs: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (num, den) = pairs
        .into_iter()
        .filter(|(w, s)| w.is_finite() && *w > 0.0 && s.is_finite())
        .fold((0.0, 0.0), |(n, d), (w, s)| (n + w * s, d + w));
    if den <= WEIGHT_EPSILON {
        None
    } else {
        Some(num / den)
    }
}

/// Per-timeframe blend weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeframeWeights {
    pub base: f64,
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

impl Default for TimeframeWeights {
    fn default() -> Self {
        Self {
            base: 0.40,
            short: 0.30,
            medium: 0.20,
            long: 0.10,
        }
    }
}

impl TimeframeWeights {
    pub fn new(base: f64, short: f64, medium: f64, long: f64) -> Result<Self, WeightError> {
        for tf in Timeframe::ALL {
            let value = match tf {
                Timeframe::Base => base,
                Timeframe::Short => short,
                Timeframe::Medium => medium,
                Timeframe::Long => long,
            };
            check_weight(tf.name(), value)?;
        }
        let sum = base + short + medium + long;
        if sum <= WEIGHT_EPSILON {
            return Err(WeightError::ZeroSum(sum));
        }
        Ok(Self {
            base: base / sum,
            short: short / sum,
            medium: medium / sum,
            long: long / sum,
        })
    }

    pub fn get(&self, timeframe: Timeframe) -> f64 {
        match timeframe {
            Timeframe::Base => self.base,
            Timeframe::Short => self.short,
            Timeframe::Medium => self.medium,
            Timeframe::Long => self.long,
        }
    }

    /// Weights restricted to `present`, renormalized to sum 1.0. `None` when
    /// the remaining weight is zero.
    pub fn renormalized(&self, present: &[Timeframe]) -> Option<BTreeMap<Timeframe, f64>> {
        let sum: f64 = present.iter().map(|tf| self.get(*tf)).sum();
        if sum <= WEIGHT_EPSILON {
            return None;
        }
        Some(present.iter().map(|tf| (*tf, self.get(*tf) / sum)).collect())
    }
}

#[derive(Deserialize)]
struct RawTimeframeWeights {
    #[serde(default)]
    base: f64,
    #[serde(default)]
    short: f64,
    #[serde(default)]
    medium: f64,
    #[serde(default)]
    long: f64,
}

impl<'de> Deserialize<'de> for TimeframeWeights {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawTimeframeWeights::deserialize(deserializer)?;
        TimeframeWeights::new(raw.base, raw.short, raw.medium, raw.long)
            .map_err(serde::de::Error::custom)
    }
}
