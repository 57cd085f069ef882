//! Guarded numeric primitives.
//!
//! Every division, logarithm and square root inside indicator code goes
//! through this module. None of these functions panic or return NaN/Infinity:
//! a degenerate operand yields the caller-supplied default instead.
//!
//! The slice variants apply the same masking per element as a select
//! (compute the quotient, then keep it or the default), so hot loops stay
//! free of early exits.

/// Denominator magnitude below which a division is considered degenerate.
pub const EPSILON: f64 = 1e-10;

/// The universal "no actionable signal / degenerate input" score.
pub const NEUTRAL_SCORE: f64 = 50.0;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// `numerator / denominator`, or `default` when the denominator is within
/// [`EPSILON`] of zero or either operand is non-finite.
#[inline]
pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    safe_divide_with(numerator, denominator, default, EPSILON)
}

/// [`safe_divide`] with an explicit epsilon.
#[inline]
pub fn safe_divide_with(numerator: f64, denominator: f64, default: f64, epsilon: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator.abs() < epsilon {
        return default;
    }
    let quotient = numerator / denominator;
    if quotient.is_finite() {
        quotient
    } else {
        default
    }
}

/// Natural logarithm; `default` for `x <= 0` or non-finite `x`.
#[inline]
pub fn safe_log(x: f64, default: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x.ln()
    } else {
        default
    }
}

/// Square root; `default` for `x < 0` or non-finite `x`.
///
/// `safe_sqrt(0.0, _)` is `0.0`.
#[inline]
pub fn safe_sqrt(x: f64, default: f64) -> f64 {
    if x.is_finite() && x >= 0.0 {
        x.sqrt()
    } else {
        default
    }
}

/// Clamp `value` into `[lo, hi]`. NaN maps to the midpoint of the range.
#[inline]
pub fn clip_to_range(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        return lo + (hi - lo) / 2.0;
    }
    value.max(lo).min(hi)
}

/// Clamp into the score range `[0, 100]`; NaN becomes [`NEUTRAL_SCORE`].
#[inline]
pub fn clip_score(value: f64) -> f64 {
    clip_to_range(value, MIN_SCORE, MAX_SCORE)
}

/// Map an unbounded signed reading onto a score: `50 + 50 * tanh(x)`.
#[inline]
pub fn tanh_score(x: f64) -> f64 {
    if x.is_nan() {
        return NEUTRAL_SCORE;
    }
    clip_score(NEUTRAL_SCORE + 50.0 * x.tanh())
}

/// Map a ratio in `[-1, 1]` onto a score: `50 + 50 * ratio`.
#[inline]
pub fn ratio_score(ratio: f64) -> f64 {
    clip_score(NEUTRAL_SCORE + 50.0 * clip_to_range(ratio, -1.0, 1.0))
}

/// Normalized difference `(a - b) / (a + b)`, `0.0` when both sides are empty.
#[inline]
pub fn imbalance(a: f64, b: f64) -> f64 {
    safe_divide(a - b, a + b, 0.0)
}

// ── Slice variants ───────────────────────────────────────────────────

/// Element-wise [`safe_divide`]. Output length is the shorter input's length.
pub fn safe_divide_slice(numerators: &[f64], denominators: &[f64], default: f64) -> Vec<f64> {
    numerators
        .iter()
        .zip(denominators)
        .map(|(&n, &d)| {
            let valid = n.is_finite() && d.is_finite() && d.abs() >= EPSILON;
            let quotient = n / d;
            if valid && quotient.is_finite() {
                quotient
            } else {
                default
            }
        })
        .collect()
}

/// Element-wise [`clip_to_range`].
pub fn clip_slice(values: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    values.iter().map(|&v| clip_to_range(v, lo, hi)).collect()
}

// ── Series helpers ───────────────────────────────────────────────────

/// Mean of the finite values, `None` if there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Population standard deviation of the finite values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let (sq, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + (v - m).powi(2), c + 1));
    Some(safe_sqrt(safe_divide(sq, count as f64, 0.0), 0.0))
}

/// Simple moving average of the trailing `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    mean(&values[values.len() - period..])
}

/// Exponential moving average series seeded with the SMA of the first
/// `period` values. Entries before the seed are NaN.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    for i in period..n {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// True range of a bar given the previous close.
#[inline]
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}
