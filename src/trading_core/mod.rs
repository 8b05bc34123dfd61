//! Trading Core - the per-bar CVD trendline strategy
//!
//! This module contains the core strategy components:
//! - 1-minute bar aggregation with running CVD
//! - CVD bar coloring
//! - Rolling N-bar windows
//! - Constrained support/resistance trendline fitting
//! - Breakout confirmation filters
//! - Single-position risk state machine
//! - The engine that drives all of the above once per sealed bar

pub mod bars;
pub mod cvd_color;
pub mod window;
pub mod trendline;
pub mod filters;
pub mod risk;
pub mod engine;

// Re-export commonly used types
pub use bars::BarAggregator;
pub use window::RollingWindow;
pub use trendline::{fit_trendlines, classify_breakout, TrendLine, TrendlineFit};
pub use filters::{FilterOutcome, FilterStage, SignalFilterChain};
pub use risk::{Position, PositionState, RiskManager, RiskSummary};
pub use engine::SignalEngine;
