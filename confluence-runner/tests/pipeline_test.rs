//! Integration tests for the scoring pipeline: data files, synthetic data,
//! the result cache and gating, end to end.

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};

use confluence_core::domain::Timeframe;
use confluence_runner::data_loader::{ORDERBOOK_FILE, TRADES_FILE};
use confluence_runner::{
    export, load_symbol, open_cache, score_symbols, synthetic_frames, write_symbol, DataSource,
    GateDecision, LoadError, RunnerConfig, SyntheticOptions,
};

fn end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn opts() -> SyntheticOptions {
    SyntheticOptions {
        bars: 150,
        trades: 300,
        book_levels: 10,
    }
}

fn synthetic() -> DataSource {
    DataSource::Synthetic { end: end(), opts: opts() }
}

fn config(cache_dir: &Path) -> RunnerConfig {
    RunnerConfig {
        symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
        cache_dir: cache_dir.to_path_buf(),
        ..RunnerConfig::default()
    }
}

// ── Synthetic runs ───────────────────────────────────────────────────

#[test]
fn synthetic_run_scores_every_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let scores = score_symbols(&config, synthetic(), None, end()).unwrap();
    assert_eq!(scores.len(), 3);
    for s in &scores {
        assert!((0.0..=100.0).contains(&s.result.score), "{}: {}", s.symbol, s.result.score);
        assert!((0.0..=1.0).contains(&s.result.confidence));
        assert_eq!(s.result.components.len(), 6);
        assert_eq!(s.timestamp, end());
        assert!(!s.cached);
        assert_eq!(s.decision, config.gate.decide_score(s.result.score));
    }
    // Output is ordered by symbol.
    let symbols: Vec<&str> = scores.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
}

#[test]
fn synthetic_runs_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let a = score_symbols(&config, synthetic(), None, end()).unwrap();
    let b = score_symbols(&config, synthetic(), None, end()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn sequential_config_gives_the_same_scores() {
    let dir = tempfile::tempdir().unwrap();
    let parallel = config(dir.path());
    let mut sequential = parallel.clone();
    sequential.engine.parallel = false;
    assert_eq!(
        score_symbols(&parallel, synthetic(), None, end()).unwrap(),
        score_symbols(&sequential, synthetic(), None, end()).unwrap()
    );
}

// ── Cache ────────────────────────────────────────────────────────────

#[test]
fn second_run_is_served_from_cache_until_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.cache_ttl_secs = 120;
    let cache = open_cache(&config).unwrap().unwrap();

    let first = score_symbols(&config, synthetic(), Some(&cache), end()).unwrap();
    assert!(first.iter().all(|s| !s.cached));
    assert_eq!(cache.len().unwrap(), 3);

    let second = score_symbols(&config, synthetic(), Some(&cache), end() + Duration::seconds(60)).unwrap();
    assert!(second.iter().all(|s| s.cached));
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.result, b.result);
        assert_eq!(a.decision, b.decision);
    }

    let third = score_symbols(&config, synthetic(), Some(&cache), end() + Duration::seconds(120)).unwrap();
    assert!(third.iter().all(|s| !s.cached));
}

#[test]
fn cache_is_namespaced_by_engine_settings() {
    let dir = tempfile::tempdir().unwrap();
    let config_a = config(dir.path());
    let mut config_b = config_a.clone();
    config_b.engine.rolling.window = 500;

    let cache_a = open_cache(&config_a).unwrap().unwrap();
    let cache_b = open_cache(&config_b).unwrap().unwrap();
    assert_ne!(cache_a.dir(), cache_b.dir());

    score_symbols(&config_a, synthetic(), Some(&cache_a), end()).unwrap();
    let b = score_symbols(&config_b, synthetic(), Some(&cache_b), end()).unwrap();
    assert!(b.iter().all(|s| !s.cached));
}

#[test]
fn zero_ttl_disables_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.cache_ttl_secs = 0;
    assert!(open_cache(&config).unwrap().is_none());
}

// ── Data files ───────────────────────────────────────────────────────

#[test]
fn written_frames_load_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let frames = synthetic_frames("BTCUSDT", end(), &opts()).unwrap();

    let symbol_dir = write_symbol(dir.path(), &frames).unwrap();
    assert!(symbol_dir.join("1m.csv").is_file());
    assert!(symbol_dir.join("4h.csv").is_file());
    assert!(symbol_dir.join(TRADES_FILE).is_file());
    assert!(symbol_dir.join(ORDERBOOK_FILE).is_file());

    let loaded = load_symbol(dir.path(), "BTCUSDT").unwrap();
    assert_eq!(loaded, frames);
}

#[test]
fn file_run_matches_synthetic_run() {
    let data = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = config(cache.path());
    for symbol in &config.symbols {
        write_symbol(data.path(), &synthetic_frames(symbol, end(), &opts()).unwrap()).unwrap();
    }
    config.data_dir = Some(data.path().to_path_buf());

    let from_files = score_symbols(&config, DataSource::Files, None, end()).unwrap();
    let from_memory = score_symbols(&config, synthetic(), None, end()).unwrap();
    assert_eq!(from_files, from_memory);
}

#[test]
fn hand_written_files_load_with_partial_feeds() {
    let dir = tempfile::tempdir().unwrap();
    let symbol_dir = dir.path().join("TEST");
    std::fs::create_dir_all(&symbol_dir).unwrap();

    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for i in 0..60 {
        let close = 100.0 + i as f64 * 0.5;
        csv.push_str(&format!(
            "2024-01-02T00:{i:02}:00Z,{},{},{},{close},{}\n",
            close - 0.5,
            close + 0.2,
            close - 0.7,
            1000 + i
        ));
    }
    // Base slot named by slot rather than interval.
    std::fs::write(symbol_dir.join("base.csv"), csv).unwrap();
    // Trades out of order on disk; the loader sorts them.
    std::fs::write(
        symbol_dir.join(TRADES_FILE),
        "timestamp,price,size,side\n\
         2024-01-02T00:59:30Z,129.5,2.0,buy\n\
         2024-01-02T00:59:10Z,129.4,1.0,sell\n",
    )
    .unwrap();

    let frames = load_symbol(dir.path(), "TEST").unwrap();
    assert_eq!(frames.timeframes(), vec![Timeframe::Base]);
    let base = frames.get(Timeframe::Base).unwrap();
    assert_eq!(base.len(), 60);
    assert_eq!(base.trades().len(), 2);
    assert!(base.trades()[0].timestamp < base.trades()[1].timestamp);
    assert!(base.orderbook().is_none());
    assert!(base.sentiment().is_none());
}

#[test]
fn missing_and_malformed_data_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_symbol(dir.path(), "NOPE"),
        Err(LoadError::MissingSymbol { .. })
    ));

    let empty = dir.path().join("EMPTY");
    std::fs::create_dir_all(&empty).unwrap();
    assert!(matches!(load_symbol(dir.path(), "EMPTY"), Err(LoadError::NoBars { .. })));

    let bad = dir.path().join("BAD");
    std::fs::create_dir_all(&bad).unwrap();
    std::fs::write(bad.join("1m.csv"), "timestamp,open,high,low,close,volume\nyesterday,1,2,0,1,5\n").unwrap();
    assert!(matches!(load_symbol(dir.path(), "BAD"), Err(LoadError::Csv { .. })));

    let inverted = dir.path().join("INV");
    std::fs::create_dir_all(&inverted).unwrap();
    std::fs::write(
        inverted.join("1m.csv"),
        "timestamp,open,high,low,close,volume\n2024-01-02T00:00:00Z,1,1,2,1,5\n",
    )
    .unwrap();
    assert!(matches!(load_symbol(dir.path(), "INV"), Err(LoadError::Window(_))));
}

// ── Config file and export ───────────────────────────────────────────

#[test]
fn config_file_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.toml");
    std::fs::write(
        &path,
        r#"
        symbols = ["BTCUSDT"]
        cache_ttl_secs = 0

        [gate]
        long_threshold = 50.0
        short_threshold = 49.9999
        "#,
    )
    .unwrap();
    let config = RunnerConfig::from_file(&path).unwrap();
    let scores = score_symbols(&config, synthetic(), None, end()).unwrap();
    let s = &scores[0];
    let expected = if s.result.score >= 50.0 {
        GateDecision::Long
    } else if s.result.score <= 49.9999 {
        GateDecision::Short
    } else {
        GateDecision::Neutral
    };
    assert_eq!(s.decision, expected);

    let csv = export::scores_csv(&scores).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("BTCUSDT,"));
}
