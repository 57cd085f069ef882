//! Confluence Runner: orchestration around `confluence-core`.
//!
//! This crate provides:
//! - Runner configuration (TOML) wrapping the engine configuration
//! - Market data loading from CSV/JSON files, or deterministic synthetic data
//! - A per-symbol engine registry with parallel fan-out
//! - A file-backed TTL result cache keyed by the core's cache key
//! - Alert gating thresholds
//! - JSON/CSV export and logging setup

pub mod cache;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod gate;
pub mod logging;
pub mod runner;

pub use cache::{CacheEntry, CacheStats, ResultCache};
pub use config::{ConfigError, RunnerConfig};
pub use data_loader::{load_symbol, synthetic_frames, write_symbol, LoadError, SyntheticOptions};
pub use gate::{GateDecision, GateError, SignalGate};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use runner::{
    load_frames, open_cache, score_symbols, ConfluenceRunner, DataSource, RunError, SymbolScore,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunnerConfig>();
        assert_sync::<RunnerConfig>();
        assert_send::<SignalGate>();
        assert_sync::<SignalGate>();
        assert_send::<SyntheticOptions>();
        assert_sync::<SyntheticOptions>();
    }

    #[test]
    fn runner_moves_between_threads() {
        assert_send::<ConfluenceRunner>();
    }

    #[test]
    fn outputs_are_send_sync() {
        assert_send::<SymbolScore>();
        assert_sync::<SymbolScore>();
        assert_send::<CacheEntry>();
        assert_sync::<CacheEntry>();
        assert_send::<ResultCache>();
        assert_sync::<ResultCache>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
    }
}
