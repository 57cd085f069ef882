//! Evaluation results and their wire form.
//!
//! Both result types are immutable once built: fields are private and every
//! score is clamped to `[0, 100]` (NaN becomes the neutral 50.0) on the way
//! in, so a consumer can rely on the bounds unconditionally.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::IndicatorKind;
use crate::math::{clip_score, clip_to_range, NEUTRAL_SCORE};

/// Key under which the framework stores the whole-indicator summary in
/// [`IndicatorResult::interpretation`].
pub const OVERALL: &str = "overall";

/// Human-readable bias for a score.
pub fn bias_label(score: f64) -> &'static str {
    let score = clip_score(score);
    if score >= 70.0 {
        "strongly bullish"
    } else if score >= 57.5 {
        "bullish"
    } else if score > 42.5 {
        "neutral"
    } else if score > 30.0 {
        "bearish"
    } else {
        "strongly bearish"
    }
}

// ── IndicatorResult ──────────────────────────────────────────────────

/// Output of one indicator: overall score, per-component scores and
/// per-component interpretations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawIndicatorResult")]
pub struct IndicatorResult {
    score: f64,
    components: BTreeMap<String, f64>,
    interpretation: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawIndicatorResult {
    score: f64,
    #[serde(default)]
    components: BTreeMap<String, f64>,
    #[serde(default)]
    interpretation: BTreeMap<String, String>,
}

impl From<RawIndicatorResult> for IndicatorResult {
    fn from(raw: RawIndicatorResult) -> Self {
        IndicatorResult::new(raw.score, raw.components, raw.interpretation)
    }
}

impl IndicatorResult {
    pub fn new(
        score: f64,
        components: BTreeMap<String, f64>,
        interpretation: BTreeMap<String, String>,
    ) -> Self {
        Self {
            score: clip_score(score),
            components: components
                .into_iter()
                .map(|(k, v)| (k, clip_score(v)))
                .collect(),
            interpretation,
        }
    }

    /// The "insufficient data / degenerate input" result.
    pub fn neutral(reason: impl Into<String>) -> Self {
        let mut interpretation = BTreeMap::new();
        interpretation.insert(OVERALL.to_string(), reason.into());
        Self {
            score: NEUTRAL_SCORE,
            components: BTreeMap::new(),
            interpretation,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn components(&self) -> &BTreeMap<String, f64> {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<f64> {
        self.components.get(name).copied()
    }

    pub fn interpretation(&self) -> &BTreeMap<String, String> {
        &self.interpretation
    }

    pub fn is_neutral(&self) -> bool {
        self.score == NEUTRAL_SCORE
    }
}

// ── ConfluenceResult ─────────────────────────────────────────────────

/// Errors rebuilding a result from its record form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("unknown indicator '{0}' in record")]
    UnknownIndicator(String),
}

/// Final output for one `(symbol, evaluation timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ConfluenceRecord", try_from = "ConfluenceRecord")]
pub struct ConfluenceResult {
    score_raw: f64,
    score: f64,
    consensus: f64,
    confidence: f64,
    disagreement: f64,
    quality_impact: f64,
    components: BTreeMap<IndicatorKind, IndicatorResult>,
}

impl ConfluenceResult {
    /// Assemble a result, clamping every field into its documented range.
    pub(crate) fn new(
        score_raw: f64,
        score: f64,
        consensus: f64,
        confidence: f64,
        disagreement: f64,
        components: BTreeMap<IndicatorKind, IndicatorResult>,
    ) -> Self {
        let score_raw = clip_score(score_raw);
        let score = clip_score(score);
        let disagreement = if disagreement.is_finite() {
            disagreement.max(0.0)
        } else {
            0.0
        };
        Self {
            score_raw,
            score,
            consensus: clip_to_range(consensus, 0.0, 1.0),
            confidence: clip_to_range(confidence, 0.0, 1.0),
            disagreement,
            quality_impact: score_raw - score,
            components,
        }
    }

    /// Pre-quality-adjustment directional score.
    pub fn score_raw(&self) -> f64 {
        self.score_raw
    }

    /// Quality-adjusted score; the value downstream gating uses.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn consensus(&self) -> f64 {
        self.consensus
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Variance of the indicator deviations.
    pub fn disagreement(&self) -> f64 {
        self.disagreement
    }

    /// `score_raw - score`.
    pub fn quality_impact(&self) -> f64 {
        self.quality_impact
    }

    pub fn components(&self) -> &BTreeMap<IndicatorKind, IndicatorResult> {
        &self.components
    }

    pub fn component(&self, kind: IndicatorKind) -> Option<&IndicatorResult> {
        self.components.get(&kind)
    }

    /// Flat record for downstream consumers.
    pub fn to_record(&self) -> ConfluenceRecord {
        ConfluenceRecord::from(self.clone())
    }
}

/// Flat serialized form of a [`ConfluenceResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceRecord {
    pub score: f64,
    pub score_raw: f64,
    pub confidence: f64,
    pub consensus: f64,
    pub disagreement: f64,
    pub quality_impact: f64,
    pub components: BTreeMap<String, IndicatorResult>,
}

impl From<ConfluenceResult> for ConfluenceRecord {
    fn from(result: ConfluenceResult) -> Self {
        Self {
            score: result.score,
            score_raw: result.score_raw,
            confidence: result.confidence,
            consensus: result.consensus,
            disagreement: result.disagreement,
            quality_impact: result.quality_impact,
            components: result
                .components
                .into_iter()
                .map(|(kind, r)| (kind.name().to_string(), r))
                .collect(),
        }
    }
}

impl TryFrom<ConfluenceRecord> for ConfluenceResult {
    type Error = RecordError;

    fn try_from(record: ConfluenceRecord) -> Result<Self, Self::Error> {
        let mut components = BTreeMap::new();
        for (name, result) in record.components {
            let kind =
                IndicatorKind::parse(&name).ok_or_else(|| RecordError::UnknownIndicator(name))?;
            components.insert(kind, result);
        }
        let mut result = ConfluenceResult::new(
            record.score_raw,
            record.score,
            record.consensus,
            record.confidence,
            record.disagreement,
            components,
        );
        // Keep the recorded impact verbatim so the round trip is exact.
        if record.quality_impact.is_finite() {
            result.quality_impact = record.quality_impact;
        }
        Ok(result)
    }
}
