mod consumer;
mod live;

pub use consumer::{run_consumer, ConsumerExit};
pub use live::{run_trade_feed, trade_from_msg};
