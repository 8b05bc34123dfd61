use anyhow::{Context, Result};
use databento::{
    dbn::{Schema, SType, TradeMsg},
    live::Subscription,
    LiveClient,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::types::{FeedMessage, Side, Trade};

/// Live mode: stream trades from Databento into the engine's queue.
///
/// Always finishes by sending [`FeedMessage::Terminated`] so the consumer can
/// tell a dead feed from a quiet one.
pub async fn run_trade_feed(config: FeedConfig, tx: mpsc::Sender<FeedMessage>) {
    let reason = match stream_trades(&config, &tx).await {
        Ok(()) => {
            warn!("Databento stream ended");
            "Databento stream ended".to_string()
        }
        Err(e) => {
            error!("Databento stream error: {:#}", e);
            format!("{:#}", e)
        }
    };

    // Consumer may already be gone on shutdown
    let _ = tx.send(FeedMessage::Terminated(reason)).await;
}

async fn stream_trades(config: &FeedConfig, tx: &mpsc::Sender<FeedMessage>) -> Result<()> {
    info!("Connecting to Databento...");

    let mut client = LiveClient::builder()
        .key(config.api_key.clone())?
        .dataset(config.dataset.as_str())
        .build()
        .await
        .context("Failed to connect to Databento")?;

    info!("Connected to Databento");

    let subscription = Subscription::builder()
        .symbols(vec![config.symbol.clone()])
        .schema(Schema::Trades)
        .stype_in(SType::RawSymbol)
        .build();

    client
        .subscribe(subscription)
        .await
        .context("Failed to subscribe")?;

    info!("Subscribed to: {} ({})", config.symbol, config.dataset);

    client.start().await.context("Failed to start stream")?;

    let mut skipped = 0u64;

    while let Some(record) = client
        .next_record()
        .await
        .context("Failed to read from Databento stream")?
    {
        let Some(msg) = record.get::<TradeMsg>() else {
            continue;
        };

        let Some(trade) = trade_from_msg(msg) else {
            skipped += 1;
            debug!(
                "Skipping trade with no aggressor side or undefined ts_event ({} so far)",
                skipped
            );
            continue;
        };

        if tx.send(FeedMessage::Trade(trade)).await.is_err() {
            info!("Trade queue closed, stopping feed");
            return Ok(());
        }
    }

    Ok(())
}

/// Convert a Databento trade record; `None` when it has no aggressor side
/// or no usable event time
pub fn trade_from_msg(msg: &TradeMsg) -> Option<Trade> {
    let side = Side::from_aggressor(msg.side as u8)?;
    Trade::from_fixed(msg.price, msg.size, side, msg.hd.ts_event)
}
