use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cvd_trendlines::config::validate_api_key;
use cvd_trendlines::tick_bars::{
    build_tick_bars, fetch_trades, load_trades_zst, write_tick_bars_file, DEFAULT_OUTPUT,
    DEFAULT_TICKS_PER_BAR,
};

#[derive(Parser, Debug)]
#[command(name = "tick-bars")]
#[command(about = "Build fixed-tick-count bars with CD/CDV/VWAP from Databento trades")]
struct Args {
    /// Databento API key (not needed with --input)
    #[arg(short, long, env = "DATABENTO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Databento dataset
    #[arg(long, default_value = "GLBX.MDP3")]
    dataset: String,

    /// Raw instrument symbol
    #[arg(short, long, default_value = "MESM5")]
    symbol: String,

    /// Range start, UTC (YYYY-MM-DDTHH:MM:SS)
    #[arg(long, default_value = "2025-05-07T00:00:00", value_parser = parse_utc)]
    start: DateTime<Utc>,

    /// Range end, UTC (YYYY-MM-DDTHH:MM:SS)
    #[arg(long, default_value = "2025-05-07T23:59:59", value_parser = parse_utc)]
    end: DateTime<Utc>,

    /// Read trades from a local .trades.csv.zst export instead of the API
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Trades per bar
    #[arg(short, long, default_value_t = DEFAULT_TICKS_PER_BAR)]
    ticks: usize,

    /// Output CSV path
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let trades = match &args.input {
        Some(path) => load_trades_zst(path, Some(&args.symbol))?,
        None => {
            let api_key = args
                .api_key
                .as_deref()
                .context("DATABENTO_API_KEY is required unless --input is given")?;
            validate_api_key(api_key)?;
            fetch_trades(api_key, &args.dataset, &args.symbol, args.start, args.end).await?
        }
    };

    info!("Downloaded {} ticks", trades.len());

    let bars = build_tick_bars(trades, args.ticks)?;
    info!("Built {} bars of {} ticks", bars.len(), args.ticks);

    write_tick_bars_file(&args.output, &bars)?;
    info!("Saved to {}", args.output.display());

    Ok(())
}
