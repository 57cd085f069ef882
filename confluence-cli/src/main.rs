//! Confluence CLI: scoring and result cache commands.
//!
//! Commands:
//! - `score`: evaluate the configured symbols and print JSON or CSV
//! - `generate`: write deterministic synthetic data files for symbols
//! - `cache status`: report entries, expired entries and size
//! - `cache clear` / `cache purge`: remove all or only expired entries

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use confluence_runner::{
    export, init_logging, open_cache, score_symbols, synthetic_frames, write_symbol, DataSource,
    LogFormat, RunnerConfig, SyntheticOptions,
};

#[derive(Parser)]
#[command(
    name = "confluence",
    about = "Confluence CLI: multi-indicator market scoring"
)]
struct Cli {
    /// Path to a runner TOML config. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty or json). Overrides the config file.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every configured symbol and print the scores.
    Score {
        /// Symbols to score, replacing the config's list.
        symbols: Vec<String>,

        /// Directory of `<SYMBOL>/<interval>.csv` files. Overrides the config.
        #[arg(long, conflicts_with = "synthetic")]
        data_dir: Option<PathBuf>,

        /// Score generated data instead of files.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// End time for synthetic data (RFC 3339). Defaults to now.
        #[arg(long, requires = "synthetic")]
        end: Option<String>,

        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Skip the result cache for this run.
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Write synthetic data files in the layout `score --data-dir` reads.
    Generate {
        /// Symbols to generate.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Output directory.
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,

        /// Bars per timeframe.
        #[arg(long, default_value_t = 300)]
        bars: usize,

        /// Trades on the tape.
        #[arg(long, default_value_t = 600)]
        trades: usize,

        /// End time (RFC 3339). Defaults to now.
        #[arg(long)]
        end: Option<String>,
    },
    /// Result cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry count, expired entries and size.
    Status,
    /// Delete every cached result.
    Clear,
    /// Delete expired and unreadable entries only.
    Purge,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunnerConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    let log_format = cli.log_format.unwrap_or(config.logging.format);
    init_logging(log_format, &config.logging.filter)?;

    match cli.command {
        Commands::Score {
            symbols,
            data_dir,
            synthetic,
            end,
            format,
            no_cache,
        } => run_score(config, symbols, data_dir, synthetic, end, format, no_cache),
        Commands::Generate {
            symbols,
            out_dir,
            bars,
            trades,
            end,
        } => run_generate(&symbols, &out_dir, bars, trades, end),
        Commands::Cache { action } => run_cache(&config, action),
    }
}

fn parse_end(end: Option<&str>) -> Result<DateTime<Utc>> {
    match end {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --end '{s}' (expected RFC 3339)"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn run_score(
    mut config: RunnerConfig,
    symbols: Vec<String>,
    data_dir: Option<PathBuf>,
    synthetic: bool,
    end: Option<String>,
    format: OutputFormat,
    no_cache: bool,
) -> Result<()> {
    if !symbols.is_empty() {
        config.symbols = symbols;
    }
    if data_dir.is_some() {
        config.data_dir = data_dir;
    }

    let source = if synthetic {
        DataSource::Synthetic {
            end: parse_end(end.as_deref())?,
            opts: SyntheticOptions::default(),
        }
    } else {
        if config.data_dir.is_none() {
            info!("no data_dir configured; scoring synthetic data");
        }
        DataSource::Files
    };

    let cache = if no_cache { None } else { open_cache(&config)? };
    let scores = score_symbols(&config, source, cache.as_ref(), Utc::now())?;

    let rendered = match format {
        OutputFormat::Json => export::scores_json(&scores)?,
        OutputFormat::Csv => export::scores_csv(&scores)?,
    };
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_generate(
    symbols: &[String],
    out_dir: &Path,
    bars: usize,
    trades: usize,
    end: Option<String>,
) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    let end = parse_end(end.as_deref())?;
    let opts = SyntheticOptions {
        bars,
        trades,
        ..SyntheticOptions::default()
    };
    for symbol in symbols {
        let frames = synthetic_frames(symbol, end, &opts)?;
        let dir = write_symbol(out_dir, &frames)?;
        println!("{symbol}: {}", dir.display());
    }
    Ok(())
}

fn run_cache(config: &RunnerConfig, action: CacheAction) -> Result<()> {
    let Some(cache) = open_cache(config)? else {
        println!("Cache disabled (cache_ttl_secs = 0).");
        return Ok(());
    };
    let now = Utc::now();

    match action {
        CacheAction::Status => {
            let stats = cache.stats(now)?;
            println!("Cache:   {}", cache.dir().display());
            println!("TTL:     {}s", cache.ttl().num_seconds());
            println!("Entries: {} ({} expired)", stats.entries, stats.expired);
            println!("Size:    {}", format_size(stats.bytes));
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("Removed {removed} entr{}.", if removed == 1 { "y" } else { "ies" });
        }
        CacheAction::Purge => {
            let removed = cache.purge_expired(now)?;
            println!("Purged {removed} expired entr{}.", if removed == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
