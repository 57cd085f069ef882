//! Criterion benchmarks for the scoring hot paths.
//!
//! Benchmarks:
//! 1. Rolling window update (Welford add/remove with periodic rebase)
//! 2. Single indicator compute per window size
//! 3. Full engine evaluation, sequential vs parallel indicators
//! 4. Confluence aggregation of six finished indicator results

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use confluence_core::confluence::ConfluenceAggregator;
use confluence_core::domain::{
    Bar, BookLevel, FrameSet, MarketWindow, OrderBookSnapshot, SentimentSnapshot, Timeframe,
    Trade, TradeSide,
};
use confluence_core::indicators::{build_indicator, Indicator};
use confluence_core::stats::{RollingParams, RollingWindowState};
use confluence_core::{ConfluenceEngine, EngineConfig, IndicatorKind, IndicatorResult};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn make_bars(n: usize, step_minutes: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar {
                timestamp: start() + Duration::minutes(i as i64 * step_minutes),
                open,
                high: close + 1.5,
                low: open - 1.5,
                close,
                volume: 1_000.0 + (i % 500) as f64,
            }
        })
        .collect()
}

fn make_trades(n: usize) -> Vec<Trade> {
    (0..n)
        .map(|i| Trade {
            timestamp: start() + Duration::milliseconds(i as i64 * 250),
            price: 100.0,
            size: 0.5 + (i % 7) as f64,
            side: if i % 3 == 0 { TradeSide::Sell } else { TradeSide::Buy },
        })
        .collect()
}

fn make_book() -> OrderBookSnapshot {
    OrderBookSnapshot {
        timestamp: start(),
        bids: (0..20).map(|i| BookLevel::new(99.9 - i as f64 * 0.1, 5.0 + i as f64)).collect(),
        asks: (0..20).map(|i| BookLevel::new(100.1 + i as f64 * 0.1, 4.0 + i as f64)).collect(),
    }
}

fn make_window(tf: Timeframe, bars: usize, step_minutes: i64) -> MarketWindow {
    MarketWindow::new("BENCH", tf, make_bars(bars, step_minutes))
        .unwrap()
        .with_trades(make_trades(2_000))
        .unwrap()
        .with_orderbook(make_book())
        .with_sentiment(SentimentSnapshot {
            funding_rate: Some(0.0001),
            long_short_ratio: Some(1.1),
            long_liquidations: Some(1_000.0),
            short_liquidations: Some(2_500.0),
            open_interest: Some(1.05e6),
            open_interest_prev: Some(1.0e6),
        })
}

fn make_frames(bars: usize) -> FrameSet {
    FrameSet::from_windows(
        Timeframe::ALL
            .into_iter()
            .zip([1, 5, 15, 60])
            .map(|(tf, step)| make_window(tf, bars, step)),
    )
    .unwrap()
}

// ── 1. Rolling Window ────────────────────────────────────────────────

fn bench_rolling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_window");

    for &window in &[100_usize, 1440, 10_000] {
        group.bench_with_input(BenchmarkId::new("update_10k", window), &window, |b, &w| {
            b.iter(|| {
                let mut state = RollingWindowState::new(w, 20);
                for i in 0..10_000 {
                    state.update(black_box((i as f64 * 0.37).sin()));
                }
                black_box(state.zscore(0.5))
            });
        });
    }

    group.finish();
}

// ── 2. Indicator Compute ─────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_compute");
    let rolling = RollingParams::default();

    for &bar_count in &[100_usize, 500, 2_000] {
        let window = make_window(Timeframe::Base, bar_count, 1);
        for kind in IndicatorKind::ALL {
            let weights = kind.default_weights().unwrap();
            group.bench_with_input(BenchmarkId::new(kind.name(), bar_count), &window, |b, w| {
                b.iter(|| {
                    let mut indicator = build_indicator(kind, weights.clone(), rolling);
                    black_box(indicator.evaluate(black_box(w)))
                });
            });
        }
    }

    group.finish();
}

// ── 3. Engine Evaluation ─────────────────────────────────────────────

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_evaluate");
    let settings = EngineConfig::default().validate().unwrap();

    for &bar_count in &[200_usize, 1_000] {
        let frames = make_frames(bar_count);
        for parallel in [false, true] {
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, bar_count), &frames, |b, f| {
                b.iter(|| {
                    let mut engine = ConfluenceEngine::new("BENCH", &settings)
                        .unwrap()
                        .with_parallelism(parallel);
                    black_box(engine.evaluate(black_box(f)).unwrap())
                });
            });
        }
    }

    group.finish();
}

// ── 4. Aggregation ───────────────────────────────────────────────────

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = ConfluenceAggregator::with_default_weights().unwrap();
    let components: BTreeMap<IndicatorKind, IndicatorResult> = IndicatorKind::ALL
        .iter()
        .enumerate()
        .map(|(i, k)| {
            (
                *k,
                IndicatorResult::new(40.0 + i as f64 * 5.0, BTreeMap::new(), BTreeMap::new()),
            )
        })
        .collect();

    c.bench_function("confluence_finalize", |b| {
        b.iter(|| black_box(aggregator.finalize(black_box(components.clone()))));
    });
}

criterion_group!(
    benches,
    bench_rolling,
    bench_indicators,
    bench_engine,
    bench_aggregate,
);
criterion_main!(benches);
