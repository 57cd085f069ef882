//! Per-symbol engine registry and one-shot scoring runs.
//!
//! [`ConfluenceRunner`] owns one [`ConfluenceEngine`] per symbol, so rolling
//! state never leaks between symbols. Symbols are evaluated in parallel on
//! the rayon pool; each engine is borrowed mutably by exactly one worker.
//!
//! [`score_symbols`] is the full pipeline used by the CLI: load frames, look
//! in the cache, evaluate misses, store, gate.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use confluence_core::domain::FrameSet;
use confluence_core::{
    ConfluenceCacheKey, ConfluenceEngine, ConfluenceRecord, ConfluenceResult, EngineError,
    EngineSettings,
};

use crate::cache::ResultCache;
use crate::config::RunnerConfig;
use crate::data_loader::{load_symbol, synthetic_frames, LoadError, SyntheticOptions};
use crate::gate::GateDecision;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("no engine registered for '{0}'")]
    UnknownSymbol(String),
    #[error("frames for '{0}' contain no timestamps")]
    NoTimestamp(String),
}

pub struct ConfluenceRunner {
    engines: BTreeMap<String, ConfluenceEngine>,
    parallel: bool,
}

impl ConfluenceRunner {
    pub fn new<I, S>(symbols: I, settings: &EngineSettings) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut engines = BTreeMap::new();
        for symbol in symbols {
            let symbol = symbol.into();
            let engine = ConfluenceEngine::new(symbol.clone(), settings)?;
            engines.insert(symbol, engine);
        }
        Ok(Self {
            engines,
            parallel: settings.parallel(),
        })
    }

    /// Toggle parallel fan-out across symbols.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn engine(&self, symbol: &str) -> Option<&ConfluenceEngine> {
        self.engines.get(symbol)
    }

    pub fn evaluate(&mut self, frames: &FrameSet) -> Result<ConfluenceResult, RunError> {
        let engine = self
            .engines
            .get_mut(frames.symbol())
            .ok_or_else(|| RunError::UnknownSymbol(frames.symbol().to_string()))?;
        Ok(engine.evaluate(frames)?)
    }

    /// Evaluate every symbol that has frames. Symbols without frames are
    /// skipped; frames for unregistered symbols are reported as errors.
    pub fn evaluate_all(
        &mut self,
        frames: &BTreeMap<String, FrameSet>,
    ) -> BTreeMap<String, Result<ConfluenceResult, RunError>> {
        let mut out: BTreeMap<String, Result<ConfluenceResult, RunError>> = frames
            .keys()
            .filter(|s| !self.engines.contains_key(*s))
            .map(|s| (s.clone(), Err(RunError::UnknownSymbol(s.clone()))))
            .collect();

        let run = |(symbol, engine): (&String, &mut ConfluenceEngine)| {
            frames
                .get(symbol)
                .map(|f| (symbol.clone(), engine.evaluate(f).map_err(RunError::from)))
        };
        let evaluated: Vec<(String, Result<ConfluenceResult, RunError>)> = if self.parallel {
            self.engines.par_iter_mut().filter_map(run).collect()
        } else {
            self.engines.iter_mut().filter_map(run).collect()
        };
        out.extend(evaluated);
        out
    }
}

// ── Scoring runs ─────────────────────────────────────────────────────

/// Where a run gets its frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataSource {
    /// Read `data_dir` from the config.
    Files,
    /// Generate deterministic frames ending at the given time.
    Synthetic {
        end: DateTime<Utc>,
        opts: SyntheticOptions,
    },
}

/// One symbol's outcome, as printed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolScore {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub decision: GateDecision,
    pub cached: bool,
    #[serde(flatten)]
    pub result: ConfluenceRecord,
}

/// Frames for every configured symbol. `Files` without a `data_dir` falls
/// back to synthetic data ending now.
pub fn load_frames(config: &RunnerConfig, source: DataSource) -> Result<BTreeMap<String, FrameSet>, RunError> {
    config
        .symbols
        .iter()
        .map(|symbol| -> Result<(String, FrameSet), RunError> {
            let frames = match (source, &config.data_dir) {
                (DataSource::Synthetic { end, opts }, _) => synthetic_frames(symbol, end, &opts)?,
                (DataSource::Files, Some(dir)) => load_symbol(dir, symbol)?,
                (DataSource::Files, None) => synthetic_frames(symbol, Utc::now(), &SyntheticOptions::default())?,
            };
            Ok((symbol.clone(), frames))
        })
        .collect()
}

/// The result cache for this configuration, under a subdirectory named by
/// the engine fingerprint. `None` when `cache_ttl_secs` is 0.
pub fn open_cache(config: &RunnerConfig) -> anyhow::Result<Option<ResultCache>> {
    if config.cache_ttl_secs == 0 {
        return Ok(None);
    }
    let dir = config.cache_dir.join(config.engine_fingerprint());
    Ok(Some(ResultCache::new(dir, config.cache_ttl_secs)?))
}

/// Load, evaluate (through the cache when one is given) and gate every
/// configured symbol.
pub fn score_symbols(
    config: &RunnerConfig,
    source: DataSource,
    cache: Option<&ResultCache>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<SymbolScore>> {
    let settings = config.validate().context("invalid runner configuration")?;
    let frames = load_frames(config, source).context("failed to load market data")?;
    let mut runner = ConfluenceRunner::new(config.symbols.iter().cloned(), &settings)?;

    let mut keys: BTreeMap<String, (DateTime<Utc>, ConfluenceCacheKey)> = BTreeMap::new();
    for (symbol, set) in &frames {
        let ts = set
            .latest_timestamp()
            .ok_or_else(|| RunError::NoTimestamp(symbol.clone()))?;
        keys.insert(symbol.clone(), (ts, ConfluenceCacheKey::new(symbol.clone(), ts, config.cache_bucket_secs)));
    }

    let mut hits: BTreeMap<String, ConfluenceResult> = BTreeMap::new();
    if let Some(cache) = cache {
        for (symbol, (_, key)) in &keys {
            if let Some(result) = cache.get(key, now)? {
                hits.insert(symbol.clone(), result);
            }
        }
    }
    let misses: BTreeMap<String, FrameSet> = frames
        .into_iter()
        .filter(|(symbol, _)| !hits.contains_key(symbol))
        .collect();

    info!(symbols = keys.len(), cached = hits.len(), evaluating = misses.len(), "scoring run");
    let evaluated = runner.evaluate_all(&misses);

    let mut scores = Vec::with_capacity(keys.len());
    for (symbol, (timestamp, key)) in keys {
        let (result, cached) = match hits.remove(&symbol) {
            Some(result) => (result, true),
            None => {
                let result = match evaluated.get(&symbol) {
                    Some(Ok(result)) => result.clone(),
                    Some(Err(e)) => return Err(anyhow::anyhow!("{symbol}: {e}")),
                    None => return Err(RunError::UnknownSymbol(symbol).into()),
                };
                if let Some(cache) = cache {
                    if let Err(e) = cache.put(&key, &result, now) {
                        warn!(symbol = %symbol, error = %e, "failed to cache result");
                    }
                }
                (result, false)
            }
        };
        scores.push(SymbolScore {
            decision: config.gate.decide(&result),
            symbol,
            timestamp,
            cached,
            result: result.to_record(),
        });
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use confluence_core::EngineConfig;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn settings() -> EngineSettings {
        EngineConfig::default().validate().unwrap()
    }

    fn frames_for(symbols: &[&str]) -> BTreeMap<String, FrameSet> {
        let opts = SyntheticOptions {
            bars: 120,
            trades: 200,
            book_levels: 10,
        };
        symbols
            .iter()
            .map(|s| (s.to_string(), synthetic_frames(s, end(), &opts).unwrap()))
            .collect()
    }

    #[test]
    fn evaluates_each_registered_symbol() {
        let mut runner = ConfluenceRunner::new(["BTCUSDT", "ETHUSDT"], &settings()).unwrap();
        let results = runner.evaluate_all(&frames_for(&["BTCUSDT", "ETHUSDT"]));
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.is_ok()));
        assert_eq!(runner.engine("BTCUSDT").unwrap().evaluations(), 1);
    }

    #[test]
    fn unregistered_frames_are_errors() {
        let mut runner = ConfluenceRunner::new(["BTCUSDT"], &settings()).unwrap();
        let results = runner.evaluate_all(&frames_for(&["BTCUSDT", "SOLUSDT"]));
        assert!(results["BTCUSDT"].is_ok());
        assert!(matches!(results["SOLUSDT"], Err(RunError::UnknownSymbol(_))));

        let frames = frames_for(&["SOLUSDT"]);
        assert!(matches!(runner.evaluate(&frames["SOLUSDT"]), Err(RunError::UnknownSymbol(_))));
    }

    #[test]
    fn parallel_matches_sequential() {
        let frames = frames_for(&["A", "B", "C", "D"]);
        let mut par = ConfluenceRunner::new(["A", "B", "C", "D"], &settings()).unwrap();
        let mut seq = ConfluenceRunner::new(["A", "B", "C", "D"], &settings())
            .unwrap()
            .with_parallelism(false);
        let a = par.evaluate_all(&frames);
        let b = seq.evaluate_all(&frames);
        for symbol in ["A", "B", "C", "D"] {
            assert_eq!(a[symbol].as_ref().unwrap(), b[symbol].as_ref().unwrap());
        }
    }

    #[test]
    fn symbols_are_sorted() {
        let runner = ConfluenceRunner::new(["ETHUSDT", "BTCUSDT"], &settings()).unwrap();
        assert_eq!(runner.symbols().collect::<Vec<_>>(), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn empty_symbol_fails_registration() {
        assert!(matches!(
            ConfluenceRunner::new([""], &settings()),
            Err(RunError::Engine(_))
        ));
    }
}
