use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cvd_trendlines::config::validate_api_key;
use cvd_trendlines::sinks::{DecisionJournal, JsonLinesSink, LogSink, SinkSet};
use cvd_trendlines::streams::{run_consumer, run_trade_feed, ConsumerExit};
use cvd_trendlines::{FeedConfig, SignalEngine, StrategyConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Live CVD trendline breakout signals from Databento trades")]
struct Args {
    /// Databento API key
    #[arg(short, long, env = "DATABENTO_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Raw instrument symbol to subscribe to
    #[arg(short, long, default_value = "MESM5")]
    symbol: String,

    /// Databento dataset
    #[arg(long, default_value = "GLBX.MDP3")]
    dataset: String,

    /// Bars per trendline window
    #[arg(short, long, default_value = "5")]
    window: usize,

    /// Breakout tolerance as a fraction of the resistance endpoint
    #[arg(long, default_value = "0.001")]
    tolerance: f64,

    /// Target distance as a multiple of the stop distance
    #[arg(long, default_value = "2.0")]
    reward_multiple: f64,

    /// Seconds without a trade before the open bar is force-sealed
    #[arg(long, default_value = "60")]
    no_data_timeout: u64,

    /// Color bars against their own open instead of the previous bar's range
    #[arg(long)]
    simple_color: bool,

    /// Capacity of the trade queue between the feed and the engine
    #[arg(long, default_value = "10000")]
    channel_capacity: usize,

    /// Forget the last signal direction after every exit
    #[arg(long)]
    reset_reversal_on_exit: bool,

    /// IANA timezone for bar times in the console
    #[arg(long, default_value = "America/Los_Angeles")]
    display_tz: String,

    /// Append entries and exits to this CSV file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Also print every event as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Log fitted lines and filter rejections
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            window_size: self.window,
            tolerance_pct: self.tolerance,
            reward_multiple: self.reward_multiple,
            no_data_timeout: Duration::from_secs(self.no_data_timeout),
            strong_color: !self.simple_color,
            channel_capacity: self.channel_capacity,
            reset_reversal_on_exit: self.reset_reversal_on_exit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let crate_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("cvd_trendlines={}", crate_level).parse()?)
                .add_directive("databento=info".parse()?),
        )
        .init();

    validate_api_key(&args.api_key)?;

    let display_tz: Tz = args
        .display_tz
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid display timezone {}: {:?}", args.display_tz, e))?;

    let config = args.strategy_config();
    let mut engine = SignalEngine::new(config.clone())?;

    let mut sinks = SinkSet::new();
    sinks.push(LogSink::new(display_tz));
    if args.json {
        sinks.push(JsonLinesSink::stdout());
    }
    if let Some(path) = &args.journal {
        sinks.push(DecisionJournal::open(path)?);
        info!("Decision journal: {}", path.display());
    }

    info!("Starting CVD trendline engine");
    info!("Symbol: {} ({})", args.symbol, args.dataset);
    info!(
        "Window: {} bars | Tolerance: {:.3}% | Reward: {}R | Timeout: {}s",
        config.window_size,
        config.tolerance_pct * 100.0,
        config.reward_multiple,
        config.no_data_timeout.as_secs()
    );

    let feed = FeedConfig {
        dataset: args.dataset.clone(),
        ..FeedConfig::new(args.api_key.clone(), args.symbol.clone())
    };

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let producer = tokio::spawn(run_trade_feed(feed, tx));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let result = run_consumer(rx, &mut engine, &mut sinks, shutdown).await;
    producer.abort();

    let summary = engine.risk_summary();
    info!(
        "Session: {} bars | {} entries | {} stops | {} targets | P&L: {:+.2} pts",
        engine.bars_sealed(),
        summary.entries,
        summary.stop_losses,
        summary.take_profits,
        summary.pnl_points
    );

    match result.context("Signal pipeline stopped")? {
        ConsumerExit::Interrupted => info!("Interrupted, exiting"),
    }

    Ok(())
}
