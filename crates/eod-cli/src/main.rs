//! `eod-download`: bulk downloads into the EOD snapshot cache.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use eod::{
    DEFAULT_WORKERS, DatasetType, DownloadKind, DownloadOptions, EodConfig, EodHelper, Frequency,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root, overriding the configuration
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Price series for every common stock of an exchange
    Historical(DownloadArgs),
    /// Daily market capitalization for every common stock of an exchange
    MarketCap(DownloadArgs),
    /// Fundamentals documents for every common stock of an exchange
    Fundamentals(DownloadArgs),
    /// Delete capture directories that hold no snapshot
    Prune,
    /// List the latest snapshot of every key of a dataset type
    Report {
        /// Dataset directory name, e.g. `market_cap`
        dataset: DatasetType,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Exchange to download
    #[arg(long, default_value = "US")]
    exchange_id: String,

    /// Reuse snapshots up to this many days old
    #[arg(long)]
    stale_days: Option<u32>,

    /// Concurrent requests
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// First day (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Series frequency: 1d, 1h, 5m or 1m
    #[arg(long, default_value = "1d")]
    frequency: Frequency,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn load_config(cli: &Cli) -> Result<EodConfig> {
    let mut config = match &cli.config {
        Some(path) => EodConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EodConfig::default().with_env_overrides(),
    };
    if let Some(base_path) = &cli.base_path {
        config = config.with_base_path(base_path);
    }
    Ok(config)
}

async fn download(config: EodConfig, kind: DownloadKind, args: DownloadArgs) -> Result<()> {
    if config.api_token.is_empty() {
        bail!("no API token: set api_token in the config file or EOD_API_TOKEN");
    }
    let helper = EodHelper::from_config(config);
    let options = DownloadOptions {
        frequency: args.frequency,
        start: args.start,
        end: args.end,
        stale_days: args.stale_days,
        workers: args.workers,
    };

    let summary = helper
        .download_all(kind, args.exchange_id.as_str(), &options)
        .await
        .context("building the download universe")?;

    for (symbol, error) in &summary.failures {
        warn!(%symbol, %error, "Not downloaded");
    }
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failures.len(),
        elapsed = ?summary.elapsed,
        "Download complete"
    );
    println!(
        "{:?}: {}/{} symbols in {:.1}s, {} failed",
        kind,
        summary.succeeded,
        summary.total,
        summary.elapsed.as_secs_f64(),
        summary.failures.len()
    );
    Ok(())
}

fn report_fundamentals(config: &EodConfig) -> Result<()> {
    let summary = eod::fundamentals_summary(&config.base_path)?;
    for entry in &summary.summaries {
        println!(
            "{}\t{}\t{}",
            entry.components.join("/"),
            entry.capture_date,
            serde_json::to_string(&entry.fields)?
        );
    }
    for components in &summary.empty {
        println!("{}\tempty", components.join("/"));
    }
    for dir in &summary.missing_files {
        println!("{}\tno snapshot file", dir.display());
    }
    Ok(())
}

fn report(config: &EodConfig, dataset: DatasetType) -> Result<()> {
    if dataset == DatasetType::FundamentalEquity {
        return report_fundamentals(config);
    }
    let entries = eod::latest_snapshots(&config.base_path, dataset)?;
    let series = matches!(dataset, DatasetType::HistoricalTimeSeries | DatasetType::MarketCap);
    for entry in &entries {
        let key = entry.components.join("/");
        if !series {
            println!("{key}\t{}", entry.capture_date);
            continue;
        }
        match eod::series_summary(entry) {
            Ok(summary) => println!(
                "{key}\t{}\t{}\t{}\t{}\t{}",
                summary.capture_date,
                summary.first_date.map_or_else(String::new, |d| d.to_string()),
                summary.last_date.map_or_else(String::new, |d| d.to_string()),
                summary.observations,
                if summary.is_active { "active" } else { "inactive" },
            ),
            Err(e) => warn!(key, error = %e, "Unreadable snapshot"),
        }
    }
    info!(keys = entries.len(), "Report complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let started = Instant::now();

    match cli.command {
        Command::Historical(args) => download(config, DownloadKind::Historical, args).await?,
        Command::MarketCap(args) => download(config, DownloadKind::MarketCap, args).await?,
        Command::Fundamentals(args) => download(config, DownloadKind::Fundamentals, args).await?,
        Command::Prune => {
            let removed = eod::remove_empty_snapshot_dirs(&config.base_path)?;
            println!("Removed {removed} empty capture directories");
        }
        Command::Report { dataset } => report(&config, dataset)?,
    }

    info!(elapsed = ?started.elapsed(), "Done");
    Ok(())
}
