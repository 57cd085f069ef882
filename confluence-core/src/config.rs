//! Engine configuration.
//!
//! [`EngineConfig`] is the loose, serializable form (TOML or JSON). The
//! engine only accepts [`EngineSettings`], which can only be obtained from
//! [`EngineConfig::validate`]: every weight set is normalized and every
//! parameter range-checked once, up front.
//!
//! ```toml
//! parallel = true
//!
//! [confluence_weights]
//! orderflow = 0.25
//! orderbook = 0.25
//! volume = 0.16
//! price_structure = 0.16
//! technical = 0.11
//! sentiment = 0.07
//!
//! [timeframe_weights]
//! base = 0.4
//! short = 0.3
//! medium = 0.2
//! long = 0.1
//!
//! [indicators.technical]
//! rsi = 0.5
//! macd = 0.5
//!
//! [rolling]
//! window = 1440
//! min_samples = 20
//! zscore_scale = 15.0
//! ```
//!
//! A weight table replaces the defaults as a whole; names it leaves out get
//! weight zero.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confluence::DEFAULT_CONFLUENCE_WEIGHTS;
use crate::domain::Timeframe;
use crate::indicators::IndicatorKind;
use crate::stats::RollingParams;
use crate::weights::{ComponentWeights, TimeframeWeights, WeightError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {scope} weights: {source}")]
    Weights {
        scope: String,
        #[source]
        source: WeightError,
    },
    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),
    #[error("unknown timeframe '{0}'")]
    UnknownTimeframe(String),
    #[error("rolling window must be at least 1")]
    ZeroWindow,
    #[error("rolling min_samples must be at least 2, got {0}")]
    MinSamplesTooSmall(usize),
    #[error("rolling min_samples ({min_samples}) exceeds window ({window})")]
    MinSamplesExceedWindow { min_samples: usize, window: usize },
    #[error("zscore_scale must be positive and finite, got {0}")]
    InvalidScale(f64),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Serializable engine configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Indicator name → weight in the confluence aggregate.
    pub confluence_weights: BTreeMap<String, f64>,
    /// Timeframe name (or interval such as `5m`) → blend weight.
    pub timeframe_weights: BTreeMap<String, f64>,
    /// Per-indicator component weight overrides.
    pub indicators: BTreeMap<String, BTreeMap<String, f64>>,
    pub rolling: RollingParams,
    /// Evaluate the six indicators on the rayon pool.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let tf = TimeframeWeights::default();
        Self {
            confluence_weights: DEFAULT_CONFLUENCE_WEIGHTS
                .iter()
                .map(|(name, w)| (name.to_string(), *w))
                .collect(),
            timeframe_weights: Timeframe::ALL
                .iter()
                .map(|t| (t.name().to_string(), tf.get(*t)))
                .collect(),
            indicators: BTreeMap::new(),
            rolling: RollingParams::default(),
            parallel: true,
        }
    }
}

impl EngineConfig {
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

    /// Check everything and build the settings the engine runs with.
    pub fn validate(&self) -> Result<EngineSettings, ConfigError> {
        let rolling = validate_rolling(self.rolling)?;

        if let Some(name) = self
            .confluence_weights
            .keys()
            .find(|n| IndicatorKind::parse(n).is_none())
        {
            return Err(ConfigError::UnknownIndicator(name.clone()));
        }
        let confluence_weights = ComponentWeights::new(
            self.confluence_weights.iter().map(|(k, v)| (k.clone(), *v)),
        )
        .map_err(|source| ConfigError::Weights {
            scope: "confluence".to_string(),
            source,
        })?;

        let timeframe_weights = self.timeframe_weights()?;

        let mut indicator_weights = BTreeMap::new();
        for kind in IndicatorKind::ALL {
            let weights = match self.indicators.get(kind.name()) {
                Some(overrides) => ComponentWeights::for_components(
                    overrides.iter().map(|(k, v)| (k.clone(), *v)),
                    &kind.component_names(),
                ),
                None => kind.default_weights(),
            }
            .map_err(|source| ConfigError::Weights {
                scope: kind.name().to_string(),
                source,
            })?;
            indicator_weights.insert(kind, weights);
        }
        if let Some(name) = self
            .indicators
            .keys()
            .find(|n| IndicatorKind::parse(n).is_none())
        {
            return Err(ConfigError::UnknownIndicator(name.clone()));
        }

        Ok(EngineSettings {
            confluence_weights,
            timeframe_weights,
            indicator_weights,
            rolling,
            parallel: self.parallel,
        })
    }

    fn timeframe_weights(&self) -> Result<TimeframeWeights, ConfigError> {
        let mut by_tf: BTreeMap<Timeframe, f64> = BTreeMap::new();
        for (name, weight) in &self.timeframe_weights {
            let tf = Timeframe::parse(name).ok_or_else(|| ConfigError::UnknownTimeframe(name.clone()))?;
            by_tf.insert(tf, *weight);
        }
        let get = |tf: Timeframe| by_tf.get(&tf).copied().unwrap_or(0.0);
        TimeframeWeights::new(
            get(Timeframe::Base),
            get(Timeframe::Short),
            get(Timeframe::Medium),
            get(Timeframe::Long),
        )
        .map_err(|source| ConfigError::Weights {
            scope: "timeframe".to_string(),
            source,
        })
    }
}

fn validate_rolling(rolling: RollingParams) -> Result<RollingParams, ConfigError> {
    if rolling.window == 0 {
        return Err(ConfigError::ZeroWindow);
    }
    if rolling.min_samples < 2 {
        return Err(ConfigError::MinSamplesTooSmall(rolling.min_samples));
    }
    if rolling.min_samples > rolling.window {
        return Err(ConfigError::MinSamplesExceedWindow {
            min_samples: rolling.min_samples,
            window: rolling.window,
        });
    }
    if !rolling.zscore_scale.is_finite() || rolling.zscore_scale <= 0.0 {
        return Err(ConfigError::InvalidScale(rolling.zscore_scale));
    }
    Ok(rolling)
}

/// Validated engine settings. Built only by [`EngineConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    confluence_weights: ComponentWeights,
    timeframe_weights: TimeframeWeights,
    indicator_weights: BTreeMap<IndicatorKind, ComponentWeights>,
    rolling: RollingParams,
    parallel: bool,
}

impl EngineSettings {
    pub fn confluence_weights(&self) -> &ComponentWeights {
        &self.confluence_weights
    }

    pub fn timeframe_weights(&self) -> &TimeframeWeights {
        &self.timeframe_weights
    }

    /// Component weights for `kind`; present for every kind.
    pub fn indicator_weights(&self, kind: IndicatorKind) -> Option<&ComponentWeights> {
        self.indicator_weights.get(&kind)
    }

    pub fn rolling(&self) -> RollingParams {
        self.rolling
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Same settings, sequential or parallel.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = EngineConfig::default().validate().unwrap();
        assert!(settings.parallel());
        assert_eq!(settings.rolling(), RollingParams::default());
        for kind in IndicatorKind::ALL {
            assert!(settings.indicator_weights(kind).is_some());
        }
        assert!((settings.confluence_weights().get("orderflow") - 0.25).abs() < 1e-9);
    }

    #[test]
    fn parses_partial_toml() {
        let config = EngineConfig::from_toml(
            r#"
            parallel = false

            [timeframe_weights]
            "1m" = 3.0
            "4h" = 1.0

            [indicators.technical]
            rsi = 1.0
            cci = 1.0

            [rolling]
            window = 500
            "#,
        )
        .unwrap();
        let settings = config.validate().unwrap();
        assert!(!settings.parallel());
        assert_eq!(settings.rolling().window, 500);
        assert_eq!(settings.rolling().min_samples, 20);
        assert!((settings.timeframe_weights().base - 0.75).abs() < 1e-12);
        assert_eq!(settings.timeframe_weights().short, 0.0);
        let technical = settings.indicator_weights(IndicatorKind::Technical).unwrap();
        assert!((technical.get("rsi") - 0.5).abs() < 1e-12);
        assert_eq!(technical.get("macd"), 0.0);
    }

    #[test]
    fn zero_sum_weights_fail_fast() {
        let mut config = EngineConfig::default();
        config.confluence_weights = ["orderflow", "orderbook"]
            .iter()
            .map(|n| (n.to_string(), 0.0))
            .collect();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Weights { ref scope, source: WeightError::ZeroSum(_) }) if scope == "confluence"
        ));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut config = EngineConfig::default();
        config.confluence_weights.insert("astrology".into(), 0.1);
        assert!(matches!(config.validate(), Err(ConfigError::UnknownIndicator(n)) if n == "astrology"));

        let mut config = EngineConfig::default();
        config
            .indicators
            .insert("volume".into(), [("vibes".to_string(), 1.0)].into_iter().collect());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Weights { source: WeightError::UnknownComponent { .. }, .. })
        ));

        let mut config = EngineConfig::default();
        config.timeframe_weights.insert("1w".into(), 0.1);
        assert!(matches!(config.validate(), Err(ConfigError::UnknownTimeframe(_))));

        assert!(EngineConfig::from_toml("colour = 3").is_err());
    }

    #[test]
    fn rolling_params_are_range_checked() {
        let check = |window, min_samples, zscore_scale| {
            let mut config = EngineConfig::default();
            config.rolling = RollingParams {
                window,
                min_samples,
                zscore_scale,
            };
            config.validate()
        };
        assert!(matches!(check(0, 20, 15.0), Err(ConfigError::ZeroWindow)));
        assert!(matches!(check(100, 1, 15.0), Err(ConfigError::MinSamplesTooSmall(1))));
        assert!(matches!(
            check(10, 20, 15.0),
            Err(ConfigError::MinSamplesExceedWindow { .. })
        ));
        assert!(matches!(check(100, 20, 0.0), Err(ConfigError::InvalidScale(_))));
        assert!(matches!(check(100, 20, f64::NAN), Err(ConfigError::InvalidScale(_))));
        assert!(check(100, 20, 10.0).is_ok());
    }
}
