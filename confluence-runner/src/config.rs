//! Runner configuration file.
//!
//! ```toml
//! symbols = ["BTCUSDT", "ETHUSDT"]
//! data_dir = "data"
//! cache_dir = ".confluence-cache"
//! cache_ttl_secs = 60
//! cache_bucket_secs = 60
//!
//! [engine]
//! parallel = true
//!
//! [engine.rolling]
//! window = 1440
//!
//! [gate]
//! long_threshold = 68.0
//! short_threshold = 35.0
//!
//! [logging]
//! format = "json"
//! ```
//!
//! Leaving `data_dir` out means synthetic data.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use confluence_core::{EngineConfig, EngineSettings};

use crate::gate::{GateError, SignalGate};
use crate::logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse runner config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("engine config: {0}")]
    Engine(#[from] confluence_core::ConfigError),
    #[error("gate config: {0}")]
    Gate(#[from] GateError),
    #[error("symbol list is empty")]
    NoSymbols,
    #[error("symbol '{0}' is listed twice")]
    DuplicateSymbol(String),
    #[error("symbol list contains a blank entry")]
    BlankSymbol,
}

/// Default directory for cached results.
pub const DEFAULT_CACHE_DIR: &str = ".confluence-cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub symbols: Vec<String>,
    /// Root of `<SYMBOL>/<interval>.csv` files; `None` → synthetic data.
    pub data_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Seconds a cached result stays valid. 0 disables the cache.
    pub cache_ttl_secs: u64,
    /// Width of the time bucket a result is cached under.
    pub cache_bucket_secs: u64,
    pub engine: EngineConfig,
    pub gate: SignalGate,
    pub logging: LoggingConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            data_dir: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_ttl_secs: 60,
            cache_bucket_secs: 60,
            engine: EngineConfig::default(),
            gate: SignalGate::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Check the symbol list and gate, and validate the engine section.
    pub fn validate(&self) -> Result<EngineSettings, ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = BTreeSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::BlankSymbol);
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.clone()));
            }
        }
        self.gate.validate()?;
        Ok(self.engine.validate()?)
    }

    /// Deterministic digest of the engine section.
    ///
    /// Results computed under different engine settings must not share
    /// cache entries; the runner namespaces its cache directory with this.
    pub fn engine_fingerprint(&self) -> String {
        // serde_json maps are ordered (BTreeMap), so the rendering is stable.
        let canonical = json!({ "engine": &self.engine });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        hash.to_hex()[..16].to_string()
    }
}
