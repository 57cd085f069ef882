//! Market data for the runner: files on disk or deterministic synthetic data.
//!
//! File layout, one directory per symbol:
//!
//! ```text
//! <data_dir>/<SYMBOL>/1m.csv          timestamp,open,high,low,close,volume
//! <data_dir>/<SYMBOL>/5m.csv          (any of 1m, 5m, 30m, 4h; or base, short, ...)
//! <data_dir>/<SYMBOL>/trades.csv      timestamp,price,size,side      (optional)
//! <data_dir>/<SYMBOL>/orderbook.json  OrderBookSnapshot              (optional)
//! <data_dir>/<SYMBOL>/sentiment.json  SentimentSnapshot              (optional)
//! ```
//!
//! Timestamps are RFC 3339. Rows are sorted on load and duplicate bar
//! timestamps keep the last row. The trade tape, book and sentiment attach to
//! the finest timeframe present.
//!
//! Synthetic data is seeded from the symbol name, so the same symbol always
//! produces the same frames.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use confluence_core::domain::{
    Bar, BookLevel, FrameSet, MarketWindow, OrderBookSnapshot, SentimentSnapshot, Timeframe,
    Trade, TradeSide, WindowError,
};

pub const TRADES_FILE: &str = "trades.csv";
pub const ORDERBOOK_FILE: &str = "orderbook.json";
pub const SENTIMENT_FILE: &str = "sentiment.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data directory for '{symbol}' at {path}")]
    MissingSymbol { symbol: String, path: PathBuf },
    #[error("no bar files for '{symbol}' in {path}")]
    NoBars { symbol: String, path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("bad JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid market data: {0}")]
    Window(#[from] WindowError),
}

/// Bar interval of each timeframe slot, as used for file names and for
/// synthetic spacing.
pub fn interval_minutes(timeframe: Timeframe) -> i64 {
    match timeframe {
        Timeframe::Base => 1,
        Timeframe::Short => 5,
        Timeframe::Medium => 30,
        Timeframe::Long => 240,
    }
}

// ── File rows ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct BarRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Bar {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

impl From<&Bar> for BarRow {
    fn from(bar: &Bar) -> Self {
        BarRow {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_csv<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LoadError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// First existing bar file for a slot: `1m.csv` before `base.csv`.
fn bar_file(dir: &Path, timeframe: Timeframe) -> Option<PathBuf> {
    [timeframe.default_interval(), timeframe.name()]
        .into_iter()
        .map(|stem| dir.join(format!("{stem}.csv")))
        .find(|p| p.is_file())
}

/// Sort by timestamp; for equal timestamps the later row wins.
fn normalize_bars(symbol: &str, timeframe: Timeframe, mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    let mut out: Vec<Bar> = Vec::with_capacity(before);
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    if out.len() < before {
        warn!(
            symbol,
            timeframe = %timeframe,
            dropped = before - out.len(),
            "duplicate bar timestamps collapsed"
        );
    }
    out
}

// ── Loading ──────────────────────────────────────────────────────────

/// Load every timeframe found for `symbol` under `data_dir`.
pub fn load_symbol(data_dir: &Path, symbol: &str) -> Result<FrameSet, LoadError> {
    let dir = data_dir.join(symbol);
    if !dir.is_dir() {
        return Err(LoadError::MissingSymbol {
            symbol: symbol.to_string(),
            path: dir,
        });
    }

    let mut windows: Vec<MarketWindow> = Vec::new();
    for timeframe in Timeframe::ALL {
        let Some(path) = bar_file(&dir, timeframe) else {
            continue;
        };
        let rows: Vec<BarRow> = read_csv(&path)?;
        let bars = normalize_bars(symbol, timeframe, rows.into_iter().map(Bar::from).collect());
        debug!(symbol, timeframe = %timeframe, bars = bars.len(), path = %path.display(), "loaded bars");
        windows.push(MarketWindow::new(symbol, timeframe, bars)?);
    }
    if windows.is_empty() {
        return Err(LoadError::NoBars {
            symbol: symbol.to_string(),
            path: dir,
        });
    }

    // Timeframe::ALL runs finest first.
    let finest = windows.remove(0);
    windows.insert(0, attach_feeds(&dir, finest)?);
    Ok(FrameSet::from_windows(windows)?)
}

fn attach_feeds(dir: &Path, mut window: MarketWindow) -> Result<MarketWindow, LoadError> {
    let trades_path = dir.join(TRADES_FILE);
    if trades_path.is_file() {
        let mut trades: Vec<Trade> = read_csv(&trades_path)?;
        trades.sort_by_key(|t| t.timestamp);
        window = window.with_trades(trades)?;
    }
    let book_path = dir.join(ORDERBOOK_FILE);
    if book_path.is_file() {
        window = window.with_orderbook(read_json::<OrderBookSnapshot>(&book_path)?);
    }
    let sentiment_path = dir.join(SENTIMENT_FILE);
    if sentiment_path.is_file() {
        window = window.with_sentiment(read_json::<SentimentSnapshot>(&sentiment_path)?);
    }
    Ok(window)
}

/// Write a frame set in the layout [`load_symbol`] reads.
pub fn write_symbol(data_dir: &Path, frames: &FrameSet) -> Result<PathBuf, LoadError> {
    let dir = data_dir.join(frames.symbol());
    std::fs::create_dir_all(&dir).map_err(|source| LoadError::Io {
        path: dir.clone(),
        source,
    })?;
    for (timeframe, window) in frames.iter() {
        let path = dir.join(format!("{}.csv", timeframe.default_interval()));
        write_csv(&path, window.bars().iter().map(BarRow::from))?;
        if !window.trades().is_empty() {
            write_csv(&dir.join(TRADES_FILE), window.trades())?;
        }
        if let Some(book) = window.orderbook() {
            write_json(&dir.join(ORDERBOOK_FILE), book)?;
        }
        if let Some(sentiment) = window.sentiment() {
            write_json(&dir.join(SENTIMENT_FILE), sentiment)?;
        }
    }
    Ok(dir)
}

// ── Synthetic data ───────────────────────────────────────────────────

/// Shape of generated data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticOptions {
    /// Bars per timeframe.
    pub bars: usize,
    /// Trades on the tape.
    pub trades: usize,
    /// Levels per book side.
    pub book_levels: usize,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            bars: 300,
            trades: 600,
            book_levels: 20,
        }
    }
}

fn symbol_rng(symbol: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

/// Random-walk frames for all four timeframes, ending at `end`.
///
/// Deterministic in `(symbol, end, opts)`.
pub fn synthetic_frames(
    symbol: &str,
    end: DateTime<Utc>,
    opts: &SyntheticOptions,
) -> Result<FrameSet, LoadError> {
    let mut rng = symbol_rng(symbol);
    let start_price = rng.gen_range(20.0..200.0_f64);
    // Per-symbol drift so different symbols lean different ways.
    let drift = rng.gen_range(-0.002..0.002_f64);

    let mut windows = Vec::with_capacity(Timeframe::ALL.len());
    let mut last_close = start_price;
    for timeframe in Timeframe::ALL {
        let step = interval_minutes(timeframe);
        let scale = (step as f64).sqrt();
        let first = end - Duration::minutes(step * (opts.bars.saturating_sub(1)) as i64);
        let mut price = start_price;
        let mut bars = Vec::with_capacity(opts.bars);
        for i in 0..opts.bars {
            let ret = drift * scale + rng.gen_range(-0.004..0.004) * scale;
            let open = price;
            let close = (price * (1.0 + ret)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002) * scale);
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002) * scale);
            bars.push(Bar {
                timestamp: first + Duration::minutes(step * i as i64),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(50.0..500.0) * step as f64,
            });
            price = close;
        }
        if timeframe == Timeframe::Base {
            last_close = price;
        }
        windows.push(MarketWindow::new(symbol, timeframe, bars)?);
    }

    let base = windows.remove(0);
    let base = base
        .with_trades(synthetic_trades(&mut rng, end, last_close, drift, opts.trades))?
        .with_orderbook(synthetic_book(&mut rng, end, last_close, opts.book_levels))
        .with_sentiment(synthetic_sentiment(&mut rng));
    windows.insert(0, base);

    debug!(symbol, bars = opts.bars, trades = opts.trades, "generated synthetic frames");
    Ok(FrameSet::from_windows(windows)?)
}

fn synthetic_trades(
    rng: &mut StdRng,
    end: DateTime<Utc>,
    price: f64,
    drift: f64,
    n: usize,
) -> Vec<Trade> {
    // Buy probability leans with the drift.
    let p_buy = (0.5 + drift * 100.0).clamp(0.2, 0.8);
    let first = end - Duration::milliseconds(500 * n as i64);
    (0..n)
        .map(|i| {
            let side = if rng.gen_bool(p_buy) {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            };
            // Occasional block print.
            let size = if rng.gen_bool(0.03) {
                rng.gen_range(20.0..60.0)
            } else {
                rng.gen_range(0.01..3.0)
            };
            Trade {
                timestamp: first + Duration::milliseconds(500 * i as i64),
                price: price * (1.0 + rng.gen_range(-0.0005..0.0005)),
                size,
                side,
            }
        })
        .collect()
}

fn synthetic_book(rng: &mut StdRng, end: DateTime<Utc>, mid: f64, levels: usize) -> OrderBookSnapshot {
    let tick = mid * 1e-4;
    let bids = (0..levels)
        .map(|i| BookLevel::new(mid - tick * (i as f64 + 1.0), rng.gen_range(0.5..10.0)))
        .collect();
    let asks = (0..levels)
        .map(|i| BookLevel::new(mid + tick * (i as f64 + 1.0), rng.gen_range(0.5..10.0)))
        .collect();
    OrderBookSnapshot {
        timestamp: end,
        bids,
        asks,
    }
}

fn synthetic_sentiment(rng: &mut StdRng) -> SentimentSnapshot {
    let open_interest_prev = rng.gen_range(1e6..5e6);
    SentimentSnapshot {
        funding_rate: Some(rng.gen_range(-0.0005..0.0005)),
        long_short_ratio: Some(rng.gen_range(0.6..1.6)),
        long_liquidations: Some(rng.gen_range(0.0..2e5)),
        short_liquidations: Some(rng.gen_range(0.0..2e5)),
        open_interest: Some(open_interest_prev * (1.0 + rng.gen_range(-0.05..0.05))),
        open_interest_prev: Some(open_interest_prev),
    }
}
