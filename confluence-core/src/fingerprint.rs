//! Cache identities for evaluation results.
//!
//! - `ConfluenceCacheKey`: one confluence result per `(symbol, time bucket)`.
//! - `IndicatorCacheKey` (in `framework`): one blended indicator result per
//!   `(symbol, timeframes, indicator)`.
//!
//! Both have a readable string form and a BLAKE3 digest of a canonical JSON
//! rendering, stable across builds and platforms.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hex BLAKE3 digest of a canonical JSON value.
pub(crate) fn canonical_digest(canonical: &serde_json::Value) -> String {
    blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string()
}

/// Cache key for a confluence result: the symbol and the time bucket the
/// evaluation falls in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfluenceCacheKey {
    pub symbol: String,
    pub bucket: i64,
}

impl ConfluenceCacheKey {
    /// `bucket = floor(timestamp_secs / bucket_secs)`. A zero bucket width is
    /// treated as one second.
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>, bucket_secs: u64) -> Self {
        let width = i64::try_from(bucket_secs.max(1)).unwrap_or(i64::MAX);
        Self {
            symbol: symbol.into(),
            bucket: timestamp.timestamp().div_euclid(width),
        }
    }

    /// Stable digest, usable as a file name.
    pub fn hash(&self) -> String {
        use serde_json::json;

        let canonical = json!({
            "bucket": self.bucket,
            "symbol": &self.symbol,
        });
        canonical_digest(&canonical)
    }
}

impl fmt::Display for ConfluenceCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn same_bucket_same_key() {
        let a = ConfluenceCacheKey::new("BTCUSDT", ts(1_700_000_010), 60);
        let b = ConfluenceCacheKey::new("BTCUSDT", ts(1_700_000_039), 60);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.to_string(), format!("BTCUSDT:{}", 1_700_000_010 / 60));
    }

    #[test]
    fn next_bucket_differs() {
        let a = ConfluenceCacheKey::new("BTCUSDT", ts(1_700_000_039), 60);
        let b = ConfluenceCacheKey::new("BTCUSDT", ts(1_700_000_040), 60);
        assert_ne!(a.bucket, b.bucket);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn symbol_is_part_of_identity() {
        let a = ConfluenceCacheKey::new("BTCUSDT", ts(0), 60);
        let b = ConfluenceCacheKey::new("ETHUSDT", ts(0), 60);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_is_stable() {
        let key = ConfluenceCacheKey {
            symbol: "BTCUSDT".into(),
            bucket: 42,
        };
        assert_eq!(key.hash(), key.clone().hash());
        assert_eq!(key.hash().len(), 64);
        assert!(key.hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn zero_width_bucket_is_one_second() {
        let key = ConfluenceCacheKey::new("X", ts(125), 0);
        assert_eq!(key.bucket, 125);
    }
}
