//! Rolling statistics over a fixed window.
//!
//! Cumulative indicators (order-flow delta, on-balance flow) are unbounded if
//! kept as running totals. Instead, each sample is pushed into a
//! [`RollingWindowState`] and scored by its z-score against the recent
//! window, which is bounded and comparable across symbols.
//!
//! Mean and variance are maintained with Welford's online update. When the
//! ring is full the oldest sample is removed with the inverse update, and the
//! accumulators are recomputed exactly from the buffer once per `capacity`
//! updates so rounding error cannot build up over unbounded running time.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::math::{clip_score, safe_sqrt, EPSILON, NEUTRAL_SCORE};

/// Default window: 24 hours of one-minute samples.
pub const DEFAULT_WINDOW: usize = 1440;

/// Default minimum number of samples before z-scores are reported.
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Default z-score to score multiplier (z = ±3.33 reaches the bounds).
pub const DEFAULT_ZSCORE_SCALE: f64 = 15.0;

/// Rolling window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingParams {
    pub window: usize,
    pub min_samples: usize,
    pub zscore_scale: f64,
}

impl Default for RollingParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            zscore_scale: DEFAULT_ZSCORE_SCALE,
        }
    }
}

/// `clip(50 + z * scale, 0, 100)`; NaN maps to neutral.
pub fn normalize_to_score(zscore: f64, scale: f64) -> f64 {
    clip_score(NEUTRAL_SCORE + zscore * scale)
}

/// Windowed mean/variance estimator.
#[derive(Debug, Clone)]
pub struct RollingWindowState {
    buffer: VecDeque<f64>,
    capacity: usize,
    min_samples: usize,
    mean: f64,
    m2: f64,
    updates_since_rebase: usize,
}

impl RollingWindowState {
    /// A zero capacity is raised to 1; `EngineConfig` validation rejects it
    /// before it gets here.
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            min_samples,
            mean: 0.0,
            m2: 0.0,
            updates_since_rebase: 0,
        }
    }

    pub fn from_params(params: &RollingParams) -> Self {
        Self::new(params.window, params.min_samples)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether enough samples exist for a statistically meaningful z-score.
    pub fn is_warm(&self) -> bool {
        self.buffer.len() >= self.min_samples
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance of the window (0.0 with fewer than two samples).
    pub fn variance(&self) -> f64 {
        let n = self.buffer.len();
        if n < 2 {
            return 0.0;
        }
        (self.m2 / (n - 1) as f64).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        safe_sqrt(self.variance(), 0.0)
    }

    /// Push a sample and return the updated `(mean, variance)`.
    ///
    /// Non-finite samples are ignored.
    pub fn update(&mut self, value: f64) -> (f64, f64) {
        if !value.is_finite() {
            debug!(value, "ignoring non-finite rolling sample");
            return (self.mean, self.variance());
        }

        self.buffer.push_back(value);
        let n = self.buffer.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);

        if self.buffer.len() > self.capacity {
            if let Some(old) = self.buffer.pop_front() {
                self.remove(old);
            }
        }

        self.updates_since_rebase += 1;
        if self.updates_since_rebase >= self.capacity {
            self.rebase();
        }

        (self.mean, self.variance())
    }

    /// `(value - mean) / max(std_dev, EPSILON)`; 0.0 (neutral) until the
    /// window holds `min_samples` samples or when `value` is non-finite.
    pub fn zscore(&self, value: f64) -> f64 {
        if !self.is_warm() || !value.is_finite() {
            return 0.0;
        }
        let z = (value - self.mean) / self.std_dev().max(EPSILON);
        if z.is_finite() {
            z
        } else {
            0.0
        }
    }

    /// Score of `value` against the window. Neutral while cold or when the
    /// window has no dispersion.
    pub fn score(&self, value: f64, scale: f64) -> f64 {
        if !self.is_warm() || self.std_dev() < EPSILON {
            return NEUTRAL_SCORE;
        }
        normalize_to_score(self.zscore(value), scale)
    }

    fn remove(&mut self, value: f64) {
        let n = self.buffer.len();
        if n == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let delta = value - self.mean;
        let new_mean = self.mean - delta / n as f64;
        self.m2 -= delta * (value - new_mean);
        self.mean = new_mean;
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    /// Recompute mean and M2 exactly (two-pass) from the buffer.
    fn rebase(&mut self) {
        self.updates_since_rebase = 0;
        let n = self.buffer.len();
        if n == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let mean = self.buffer.iter().sum::<f64>() / n as f64;
        self.m2 = self.buffer.iter().map(|v| (v - mean).powi(2)).sum();
        self.mean = mean;
    }
}

/// A [`RollingWindowState`] fed from a timestamped series.
///
/// Evaluation passes see overlapping windows of history. The tracker keeps a
/// watermark and only ingests samples strictly newer than the last one seen,
/// so re-evaluating the same window does not double count.
#[derive(Debug, Clone)]
pub struct FlowTracker {
    stats: RollingWindowState,
    watermark: Option<DateTime<Utc>>,
    latest: Option<f64>,
}

impl FlowTracker {
    pub fn new(params: &RollingParams) -> Self {
        Self {
            stats: RollingWindowState::from_params(params),
            watermark: None,
            latest: None,
        }
    }

    /// Ingest `(timestamp, value)` samples in chronological order and return
    /// how many were new.
    pub fn ingest<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        let mut added = 0;
        for (ts, value) in samples {
            if self.watermark.is_some_and(|w| ts <= w) {
                continue;
            }
            self.watermark = Some(ts);
            if value.is_finite() {
                self.stats.update(value);
                self.latest = Some(value);
                added += 1;
            }
        }
        added
    }

    /// Score of the most recent sample, neutral if none.
    pub fn latest_score(&self, scale: f64) -> f64 {
        match self.latest {
            Some(v) => self.stats.score(v, scale),
            None => NEUTRAL_SCORE,
        }
    }

    pub fn latest_zscore(&self) -> f64 {
        self.latest.map(|v| self.stats.zscore(v)).unwrap_or(0.0)
    }

    pub fn stats(&self) -> &RollingWindowState {
        &self.stats
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }
}
