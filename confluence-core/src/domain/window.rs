//! Market windows: the immutable input of one analysis pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Bar, OrderBookSnapshot, SentimentSnapshot, Timeframe, Trade};

/// Contract violations in market data handed to the engine.
///
/// Degenerate values (zero volume, NaN prices) are not contract violations;
/// they score neutral. These errors are about malformed structure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowError {
    #[error("market window has an empty symbol")]
    EmptySymbol,
    #[error("{symbol}/{timeframe}: bar {index} is not after the previous bar")]
    UnorderedBars {
        symbol: String,
        timeframe: Timeframe,
        index: usize,
    },
    #[error("{symbol}/{timeframe}: bar {index} has high below low")]
    InvertedBar {
        symbol: String,
        timeframe: Timeframe,
        index: usize,
    },
    #[error("{symbol}/{timeframe}: trade {index} is earlier than the previous trade")]
    UnorderedTrades {
        symbol: String,
        timeframe: Timeframe,
        index: usize,
    },
    #[error("window for '{found}' added to frame set for '{expected}'")]
    SymbolMismatch { expected: String, found: String },
    #[error("frame set for '{0}' has no windows")]
    EmptyFrameSet(String),
}

/// OHLCV bars for one symbol and timeframe, plus the optional trade tape,
/// order book and sentiment readings captured alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMarketWindow")]
pub struct MarketWindow {
    symbol: String,
    timeframe: Timeframe,
    bars: Vec<Bar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trades: Vec<Trade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orderbook: Option<OrderBookSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sentiment: Option<SentimentSnapshot>,
}

/// Unvalidated wire form of [`MarketWindow`].
#[derive(Debug, Deserialize)]
struct RawMarketWindow {
    symbol: String,
    timeframe: Timeframe,
    bars: Vec<Bar>,
    #[serde(default)]
    trades: Vec<Trade>,
    #[serde(default)]
    orderbook: Option<OrderBookSnapshot>,
    #[serde(default)]
    sentiment: Option<SentimentSnapshot>,
}

impl TryFrom<RawMarketWindow> for MarketWindow {
    type Error = WindowError;

    fn try_from(raw: RawMarketWindow) -> Result<Self, Self::Error> {
        let mut window = MarketWindow::new(raw.symbol, raw.timeframe, raw.bars)?;
        window = window.with_trades(raw.trades)?;
        window.orderbook = raw.orderbook;
        window.sentiment = raw.sentiment;
        Ok(window)
    }
}

impl MarketWindow {
    /// Validate and wrap a bar series.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        bars: Vec<Bar>,
    ) -> Result<Self, WindowError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(WindowError::EmptySymbol);
        }
        for (index, bar) in bars.iter().enumerate() {
            // NaN comparisons are false: void bars are degenerate, not malformed.
            if bar.high < bar.low {
                return Err(WindowError::InvertedBar {
                    symbol,
                    timeframe,
                    index,
                });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(WindowError::UnorderedBars {
                    symbol,
                    timeframe,
                    index,
                });
            }
        }
        Ok(Self {
            symbol,
            timeframe,
            bars,
            trades: Vec::new(),
            orderbook: None,
            sentiment: None,
        })
    }

    /// Attach the trade tape. Trades must be in non-decreasing time order.
    pub fn with_trades(mut self, trades: Vec<Trade>) -> Result<Self, WindowError> {
        if let Some(index) = (1..trades.len()).find(|&i| trades[i].timestamp < trades[i - 1].timestamp) {
            return Err(WindowError::UnorderedTrades {
                symbol: self.symbol,
                timeframe: self.timeframe,
                index,
            });
        }
        self.trades = trades;
        Ok(self)
    }

    pub fn with_orderbook(mut self, orderbook: OrderBookSnapshot) -> Self {
        self.orderbook = Some(orderbook);
        self
    }

    pub fn with_sentiment(mut self, sentiment: SentimentSnapshot) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn orderbook(&self) -> Option<&OrderBookSnapshot> {
        self.orderbook.as_ref()
    }

    pub fn sentiment(&self) -> Option<&SentimentSnapshot> {
        self.sentiment.as_ref()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close prices in bar order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Timestamp of the newest bar, trade or book snapshot.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let bar = self.bars.last().map(|b| b.timestamp);
        let trade = self.trades.last().map(|t| t.timestamp);
        let book = self.orderbook.as_ref().map(|b| b.timestamp);
        [bar, trade, book].into_iter().flatten().max()
    }
}

/// All windows of one symbol, keyed by timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSet {
    symbol: String,
    windows: BTreeMap<Timeframe, MarketWindow>,
}

impl FrameSet {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            windows: BTreeMap::new(),
        }
    }

    /// Build from windows that must all share one symbol. Later windows
    /// replace earlier ones with the same timeframe.
    pub fn from_windows<I>(windows: I) -> Result<Self, WindowError>
    where
        I: IntoIterator<Item = MarketWindow>,
    {
        let mut iter = windows.into_iter();
        let first = iter.next().ok_or_else(|| WindowError::EmptyFrameSet(String::new()))?;
        let mut set = FrameSet::new(first.symbol());
        set.insert(first)?;
        for window in iter {
            set.insert(window)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, window: MarketWindow) -> Result<(), WindowError> {
        if window.symbol() != self.symbol {
            return Err(WindowError::SymbolMismatch {
                expected: self.symbol.clone(),
                found: window.symbol().to_string(),
            });
        }
        self.windows.insert(window.timeframe(), window);
        Ok(())
    }

    /// Structural check run by the engine before every evaluation.
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.symbol.trim().is_empty() {
            return Err(WindowError::EmptySymbol);
        }
        if self.windows.is_empty() {
            return Err(WindowError::EmptyFrameSet(self.symbol.clone()));
        }
        if let Some(window) = self.windows.values().find(|w| w.symbol() != self.symbol) {
            return Err(WindowError::SymbolMismatch {
                expected: self.symbol.clone(),
                found: window.symbol().to_string(),
            });
        }
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&MarketWindow> {
        self.windows.get(&timeframe)
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.windows.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &MarketWindow)> {
        self.windows.iter().map(|(tf, w)| (*tf, w))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.windows.values().filter_map(MarketWindow::latest_timestamp).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeSide;
    use chrono::TimeZone;

    fn bar_at(secs: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn rejects_empty_symbol() {
        assert_eq!(
            MarketWindow::new("  ", Timeframe::Base, vec![]),
            Err(WindowError::EmptySymbol)
        );
    }

    #[test]
    fn rejects_unordered_bars() {
        let bars = vec![bar_at(60, 1.0), bar_at(60, 2.0)];
        let err = MarketWindow::new("BTC", Timeframe::Base, bars).unwrap_err();
        assert!(matches!(err, WindowError::UnorderedBars { index: 1, .. }));
    }

    #[test]
    fn rejects_inverted_bar() {
        let mut bar = bar_at(60, 10.0);
        bar.high = 5.0;
        let err = MarketWindow::new("BTC", Timeframe::Base, vec![bar]).unwrap_err();
        assert!(matches!(err, WindowError::InvertedBar { index: 0, .. }));
    }

    #[test]
    fn void_bars_are_not_contract_violations() {
        let mut bar = bar_at(60, 10.0);
        bar.high = f64::NAN;
        assert!(MarketWindow::new("BTC", Timeframe::Base, vec![bar]).is_ok());
    }

    #[test]
    fn rejects_unordered_trades() {
        let window = MarketWindow::new("BTC", Timeframe::Base, vec![bar_at(60, 1.0)]).unwrap();
        let trades = vec![
            Trade {
                timestamp: Utc.timestamp_opt(10, 0).unwrap(),
                price: 1.0,
                size: 1.0,
                side: TradeSide::Buy,
            },
            Trade {
                timestamp: Utc.timestamp_opt(5, 0).unwrap(),
                price: 1.0,
                size: 1.0,
                side: TradeSide::Sell,
            },
        ];
        assert!(matches!(
            window.with_trades(trades),
            Err(WindowError::UnorderedTrades { index: 1, .. })
        ));
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{
            "symbol": "BTC",
            "timeframe": "base",
            "bars": [
                {"timestamp": "2024-01-01T00:01:00Z", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 3.0},
                {"timestamp": "2024-01-01T00:00:00Z", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 3.0}
            ]
        }"#;
        assert!(serde_json::from_str::<MarketWindow>(json).is_err());

        let missing_close = r#"{
            "symbol": "BTC",
            "timeframe": "base",
            "bars": [{"timestamp": "2024-01-01T00:00:00Z", "open": 1.0, "high": 2.0, "low": 0.5, "volume": 3.0}]
        }"#;
        assert!(serde_json::from_str::<MarketWindow>(missing_close).is_err());
    }

    #[test]
    fn frame_set_enforces_single_symbol() {
        let btc = MarketWindow::new("BTC", Timeframe::Base, vec![bar_at(60, 1.0)]).unwrap();
        let eth = MarketWindow::new("ETH", Timeframe::Short, vec![bar_at(60, 1.0)]).unwrap();
        let err = FrameSet::from_windows(vec![btc, eth]).unwrap_err();
        assert!(matches!(err, WindowError::SymbolMismatch { .. }));
    }

    #[test]
    fn empty_frame_set_fails_validation() {
        let set = FrameSet::new("BTC");
        assert_eq!(set.validate(), Err(WindowError::EmptyFrameSet("BTC".into())));
    }

    #[test]
    fn latest_timestamp_spans_windows() {
        let base = MarketWindow::new("BTC", Timeframe::Base, vec![bar_at(60, 1.0), bar_at(120, 1.0)]).unwrap();
        let long = MarketWindow::new("BTC", Timeframe::Long, vec![bar_at(30, 1.0)]).unwrap();
        let set = FrameSet::from_windows(vec![base, long]).unwrap();
        assert_eq!(set.latest_timestamp(), Some(Utc.timestamp_opt(120, 0).unwrap()));
        assert_eq!(set.timeframes(), vec![Timeframe::Base, Timeframe::Long]);
    }
}
