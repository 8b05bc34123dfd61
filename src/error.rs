use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that stop the signal pipeline
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("out-of-order trade: minute {trade_minute} is earlier than bar {open_minute}")]
    OutOfOrderTrade {
        open_minute: DateTime<Utc>,
        trade_minute: DateTime<Utc>,
    },

    #[error("trade feed terminated: {0}")]
    FeedTerminated(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid Databento API key: must start with 'db-' and be 32 characters")]
    InvalidApiKey,
}
