//! Domain types: market data inputs of the scoring engine.

pub mod bar;
pub mod book;
pub mod sentiment;
pub mod timeframe;
pub mod trade;
pub mod window;

pub use bar::Bar;
pub use book::{BookLevel, OrderBookSnapshot};
pub use sentiment::SentimentSnapshot;
pub use timeframe::Timeframe;
pub use trade::{Trade, TradeSide};
pub use window::{FrameSet, MarketWindow, WindowError};

/// Symbol type alias
pub type Symbol = String;
