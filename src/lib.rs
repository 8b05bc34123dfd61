// Library crate - exports the signal engine and its collaborators

pub mod types;
pub mod error;
pub mod config;
pub mod trading_core;
pub mod streams;
pub mod sinks;
pub mod tick_bars;

// Re-export commonly used types
pub use types::*;
pub use error::EngineError;
pub use config::{FeedConfig, StrategyConfig};
pub use trading_core::SignalEngine;
