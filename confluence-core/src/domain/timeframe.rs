//! The four analysis timeframes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timeframe slot. Recent timeframes dominate the blend; longer ones give
/// trend context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Base,
    Short,
    Medium,
    Long,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Base,
        Timeframe::Short,
        Timeframe::Medium,
        Timeframe::Long,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Timeframe::Base => "base",
            Timeframe::Short => "short",
            Timeframe::Medium => "medium",
            Timeframe::Long => "long",
        }
    }

    /// Conventional bar interval for the slot.
    pub fn default_interval(self) -> &'static str {
        match self {
            Timeframe::Base => "1m",
            Timeframe::Short => "5m",
            Timeframe::Medium => "30m",
            Timeframe::Long => "4h",
        }
    }

    /// Parse either a slot name or its conventional interval.
    pub fn parse(s: &str) -> Option<Self> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.name() == s || tf.default_interval() == s)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_names_and_intervals() {
        assert_eq!(Timeframe::parse("base"), Some(Timeframe::Base));
        assert_eq!(Timeframe::parse("30m"), Some(Timeframe::Medium));
        assert_eq!(Timeframe::parse("4h"), Some(Timeframe::Long));
        assert_eq!(Timeframe::parse("1d"), None);
    }

    #[test]
    fn ordering_is_recent_first() {
        let mut tfs = vec![Timeframe::Long, Timeframe::Base, Timeframe::Medium];
        tfs.sort();
        assert_eq!(tfs, vec![Timeframe::Base, Timeframe::Medium, Timeframe::Long]);
    }
}
