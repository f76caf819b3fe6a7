//! CLI command handling

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use stars_rates::services::generate::{DEFAULT_LIMIT, DEFAULT_OUTPUT_DIR};
use stars_rates::services::{generate, GenerateOptions, HistoryStore, JsonHistoryFile, RateAggregator};
use stars_rates::sources::{
    SourceConfig, DEFAULT_BINANCE_URL, DEFAULT_FRAGMENT_ADDRESS, DEFAULT_SYMBOL,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TONCENTER_URL,
};
use stars_rates::types::{RatePoint, StarsRateError};

/// Telegram Stars -> USDT rate generator (Fragment + Binance)
#[derive(Parser)]
#[command(name = "stars-rates")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    sources: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Upstream endpoint overrides
#[derive(Args)]
struct SourceArgs {
    /// toncenter v2 API base URL
    #[arg(long, global = true, default_value = DEFAULT_TONCENTER_URL)]
    toncenter_url: String,

    /// toncenter API key (raises the rate limit)
    #[arg(long, global = true, env = "TONCENTER_API_KEY", hide_env_values = true)]
    toncenter_api_key: Option<String>,

    /// Fragment wallet whose transactions are scanned
    #[arg(long, global = true, default_value = DEFAULT_FRAGMENT_ADDRESS)]
    fragment_address: String,

    /// Binance API base URL
    #[arg(long, global = true, default_value = DEFAULT_BINANCE_URL)]
    binance_url: String,

    /// Binance ticker symbol
    #[arg(long, global = true, default_value = DEFAULT_SYMBOL)]
    symbol: String,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

impl From<SourceArgs> for SourceConfig {
    fn from(args: SourceArgs) -> Self {
        Self {
            toncenter_url: args.toncenter_url,
            toncenter_api_key: args.toncenter_api_key.filter(|k| !k.is_empty()),
            fragment_address: args.fragment_address,
            binance_url: args.binance_url,
            symbol: args.symbol,
            timeout: Duration::from_secs(args.timeout),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the rate and write rates.json, api.json and history.json
    Generate {
        /// Directory receiving the JSON files
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Marketplace transactions to examine (1-100)
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,

        /// Leave raw source payloads out of rates.json
        #[arg(long)]
        no_raw: bool,
    },

    /// Compute and print the current rate without writing files
    Rate {
        /// Marketplace transactions to examine (1-100)
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,

        /// Include raw source payloads
        #[arg(long)]
        raw: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the stored daily history
    History {
        /// Directory holding history.json
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        init_logging(self.verbose, self.quiet);
        let config = SourceConfig::from(self.sources);

        match self.command {
            Commands::Generate {
                output_dir,
                limit,
                no_raw,
            } => run_generate(
                &config,
                GenerateOptions {
                    output_dir,
                    limit,
                    include_raw: !no_raw,
                },
            ),
            Commands::Rate { limit, raw, json } => run_rate(&config, limit, raw, json),
            Commands::History { output_dir, json } => run_history(output_dir, json),
        }
    }
}

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    // Only the first init wins; later calls are harmless
    let _ = SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("stars_rates", log_level(verbose, quiet))
        .init();
}

fn run_generate(config: &SourceConfig, options: GenerateOptions) -> anyhow::Result<()> {
    let (fragment, binance) = config.build_sources()?;
    let aggregator = RateAggregator::new(fragment, binance);

    let report = generate(
        &aggregator,
        &options.snapshot_writer(),
        &options.history_store(),
        options.limit,
        options.include_raw,
    )
    .context("Rate generation failed")?;

    println!("Generated files in {}", options.output_dir.display());
    print_rate(&report.point);
    println!("History: {} days", report.history_len);
    print_warnings(&report.point);
    Ok(())
}

fn run_rate(config: &SourceConfig, limit: u32, raw: bool, json: bool) -> anyhow::Result<()> {
    let (fragment, binance) = config.build_sources()?;
    let point = RateAggregator::new(fragment, binance).compute(limit, raw)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&point)?);
    } else {
        print_rate(&point);
        if raw {
            print_raw(&point);
        }
        print_warnings(&point);
    }

    if point.usdt_per_star <= 0.0 {
        return Err(StarsRateError::IncompleteRate(point.errors).into());
    }
    Ok(())
}

fn run_history(output_dir: PathBuf, json: bool) -> anyhow::Result<()> {
    let store = HistoryStore::new(JsonHistoryFile::in_dir(&output_dir));
    let series = store.load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }

    if series.is_empty() {
        println!("No history in {}", store.repository().path().display());
        return Ok(());
    }
    println!("{:<12} {:>14} {:>12} {:>10}", "date", "USDT/Star", "TON/Star", "USDT/TON");
    for entry in &series {
        println!(
            "{:<12} {:>14.6} {:>12.6} {:>10.3}",
            entry.date.to_string(),
            entry.usdt_per_star,
            entry.ton_per_star,
            entry.usdt_per_ton
        );
    }
    Ok(())
}

fn print_rate(point: &RatePoint) {
    if point.usdt_per_star > 0.0 {
        println!("1 Star = ${:.6} USDT", point.usdt_per_star);
        println!("1000 Stars = ${:.2} USDT", point.usdt_per_star * 1000.0);
    } else {
        println!("Could not compute rate");
    }
}

fn print_raw(point: &RatePoint) {
    println!("Fragment transactions: {}", point.transactions_count());
    println!("TON/USDT rate: ${:.3}", point.usdt_per_ton);
    if let Some(quote) = point.raw.as_ref().and_then(|r| r.fragment_raw.as_ref()) {
        println!(
            "TON per Star: min {:.6} / median {:.6} / max {:.6}",
            quote.min_rate, quote.median_rate, quote.max_rate
        );
    }
}

fn print_warnings(point: &RatePoint) {
    if point.errors.is_empty() {
        return;
    }
    println!("Warnings:");
    for error in &point.errors {
        println!("  - {}", error);
    }
}
