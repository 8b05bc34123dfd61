//! Single-owner consumer loop between the trade queue and the engine

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::sinks::EventSink;
use crate::trading_core::SignalEngine;
use crate::types::{FeedMessage, PipelineEvent};

/// How the consumer stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Shutdown requested; queued trades were processed and the open bar dropped
    Interrupted,
}

/// Drive `engine` from `rx` until shutdown or until the feed dies.
///
/// A quiet feed force-seals the open bar every `no_data_timeout`. A terminated
/// feed or a closed queue is returned as [`EngineError::FeedTerminated`].
pub async fn run_consumer<S, F>(
    mut rx: mpsc::Receiver<FeedMessage>,
    engine: &mut SignalEngine,
    sink: &mut S,
    shutdown: F,
) -> Result<ConsumerExit, EngineError>
where
    S: EventSink + ?Sized,
    F: Future<Output = ()>,
{
    let no_data_timeout = engine.config().no_data_timeout;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                rx.close();
                let mut drained = 0u64;
                while let Ok(msg) = rx.try_recv() {
                    if let FeedMessage::Trade(trade) = msg {
                        dispatch(engine.on_trade(&trade)?, sink);
                        drained += 1;
                    }
                }
                info!(
                    "Shutdown: drained {} queued trades, dropping open bar ({} bars sealed)",
                    drained,
                    engine.bars_sealed()
                );
                return Ok(ConsumerExit::Interrupted);
            }

            received = tokio::time::timeout(no_data_timeout, rx.recv()) => {
                match received {
                    Ok(Some(FeedMessage::Trade(trade))) => {
                        dispatch(engine.on_trade(&trade)?, sink);
                    }
                    Ok(Some(FeedMessage::Terminated(reason))) => {
                        error!("Trade feed terminated: {}", reason);
                        return Err(EngineError::FeedTerminated(reason));
                    }
                    Ok(None) => {
                        error!("Trade queue closed");
                        return Err(EngineError::FeedTerminated("trade queue closed".to_string()));
                    }
                    Err(_) => {
                        warn!(
                            "No trades for {:?}, force-sealing open bar",
                            no_data_timeout
                        );
                        dispatch(engine.flush_open_bar(), sink);
                    }
                }
            }
        }
    }
}

fn dispatch<S: EventSink + ?Sized>(events: Vec<PipelineEvent>, sink: &mut S) {
    for event in &events {
        sink.emit(event);
    }
}
