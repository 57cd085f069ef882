//! Quality adjustment: pull low-conviction scores toward neutral.
//!
//! `score = clip(50 + (score_raw − 50)·confidence)`, with confidence clamped
//! to `[0, 1]` first; non-finite confidence counts as 0. The adjustment is
//! continuous: there is no threshold below which a signal is dropped, only a
//! proportional shrink. A confidence of 1 leaves the raw score untouched; 0
//! collapses it to 50.

use crate::math::{clip_score, clip_to_range, NEUTRAL_SCORE};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAdjustment {
    pub score: f64,
    /// `score_raw − score`: how much the adjustment took away.
    pub quality_impact: f64,
}

pub fn adjust(score_raw: f64, confidence: f64) -> QualityAdjustment {
    let score_raw = clip_score(score_raw);
    // Unknown confidence means no trust: the score collapses to neutral.
    let confidence = if confidence.is_finite() {
        clip_to_range(confidence, 0.0, 1.0)
    } else {
        0.0
    };
    let deviation = score_raw - NEUTRAL_SCORE;
    let score = clip_score(NEUTRAL_SCORE + deviation * confidence);
    QualityAdjustment {
        score,
        quality_impact: score_raw - score,
    }
}
