//! Per-symbol evaluation context.
//!
//! A [`ConfluenceEngine`] owns the six indicator instances of one symbol, and
//! with them that symbol's rolling state. One evaluation:
//!
//! 1. Validate the frame set (non-empty, one symbol, the engine's symbol)
//! 2. Blend each indicator across timeframes (in parallel when enabled)
//! 3. Aggregate the six indicator scores
//! 4. Apply the quality adjustment
//!
//! `evaluate` takes `&mut self`: one writer per symbol at a time. Different
//! symbols live in different engines and can be evaluated concurrently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::confluence::ConfluenceAggregator;
use crate::domain::{FrameSet, WindowError};
use crate::fingerprint::ConfluenceCacheKey;
use crate::framework::{IndicatorCacheKey, TimeframeBlender};
use crate::indicators::{build_indicator, Indicator, IndicatorKind};
use crate::result::{ConfluenceResult, IndicatorResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("engine for '{engine}' was handed frames for '{frames}'")]
    WrongSymbol { engine: String, frames: String },
}

pub struct ConfluenceEngine {
    symbol: String,
    indicators: Vec<Box<dyn Indicator>>,
    blender: TimeframeBlender,
    aggregator: ConfluenceAggregator,
    parallel: bool,
    evaluations: u64,
}

impl std::fmt::Debug for ConfluenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceEngine")
            .field("symbol", &self.symbol)
            .field("indicators", &self.indicators.iter().map(|i| i.kind()).collect::<Vec<_>>())
            .field("parallel", &self.parallel)
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

impl ConfluenceEngine {
    pub fn new(symbol: impl Into<String>, settings: &EngineSettings) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(WindowError::EmptySymbol.into());
        }
        let indicators: Vec<Box<dyn Indicator>> = IndicatorKind::ALL
            .iter()
            .filter_map(|kind| {
                settings
                    .indicator_weights(*kind)
                    .map(|w| build_indicator(*kind, w.clone(), settings.rolling()))
            })
            .collect();
        info!(
            symbol = %symbol,
            indicators = indicators.len(),
            parallel = settings.parallel(),
            window = settings.rolling().window,
            "confluence engine ready"
        );
        Ok(Self {
            symbol,
            indicators,
            blender: TimeframeBlender::new(*settings.timeframe_weights()),
            aggregator: ConfluenceAggregator::new(settings.confluence_weights().clone()),
            parallel: settings.parallel(),
            evaluations: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Completed evaluations so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Score one frame set.
    pub fn evaluate(&mut self, frames: &FrameSet) -> Result<ConfluenceResult, EngineError> {
        frames.validate()?;
        if frames.symbol() != self.symbol {
            return Err(EngineError::WrongSymbol {
                engine: self.symbol.clone(),
                frames: frames.symbol().to_string(),
            });
        }

        let blender = self.blender;
        let blended: Vec<(IndicatorKind, IndicatorResult)> = if self.parallel {
            self.indicators
                .par_iter_mut()
                .map(|ind| (ind.kind(), blender.blend(ind.as_mut(), frames)))
                .collect()
        } else {
            self.indicators
                .iter_mut()
                .map(|ind| (ind.kind(), blender.blend(ind.as_mut(), frames)))
                .collect()
        };
        let components: BTreeMap<IndicatorKind, IndicatorResult> = blended.into_iter().collect();

        let result = self.aggregator.finalize(components);
        self.evaluations += 1;
        debug!(
            symbol = %self.symbol,
            timeframes = frames.len(),
            score = result.score(),
            score_raw = result.score_raw(),
            consensus = result.consensus(),
            confidence = result.confidence(),
            "confluence evaluated"
        );
        Ok(result)
    }

    /// Cache key for a result evaluated at `timestamp`.
    pub fn cache_key(&self, timestamp: DateTime<Utc>, bucket_secs: u64) -> ConfluenceCacheKey {
        ConfluenceCacheKey::new(self.symbol.clone(), timestamp, bucket_secs)
    }

    pub fn indicator_cache_key(&self, frames: &FrameSet, kind: IndicatorKind) -> IndicatorCacheKey {
        IndicatorCacheKey::new(self.symbol.clone(), frames.timeframes(), kind)
    }
}
