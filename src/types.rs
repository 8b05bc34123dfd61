use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Databento fixed-point prices are scaled by 1e9
pub const PRICE_SCALE: f64 = 1_000_000_000.0;

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Map a Databento side byte. 'B' is a buy, 'A' a sell, 'N' has no aggressor.
    pub fn from_aggressor(side: u8) -> Option<Self> {
        match side {
            b'B' | b'b' => Some(Side::Buy),
            b'A' | b'a' => Some(Side::Sell),
            _ => None,
        }
    }

    /// Signed contribution of `size` to delta/CVD
    pub fn signed(self, size: u64) -> i64 {
        match self {
            Side::Buy => size as i64,
            Side::Sell => -(size as i64),
        }
    }
}

/// Single trade print from the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub ts_event: DateTime<Utc>,
    pub price: f64,
    pub size: u64,
    pub side: Side,
}

/// Nanoseconds since the epoch as a UTC time. `None` past `i64::MAX`,
/// which includes Databento's undefined timestamp.
pub fn event_time(ts_event_nanos: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ts_event_nanos)
        .ok()
        .map(DateTime::<Utc>::from_timestamp_nanos)
}

impl Trade {
    /// Build a trade from raw feed fields (fixed-point price, nanosecond timestamp)
    pub fn from_fixed(price: i64, size: u32, side: Side, ts_event_nanos: u64) -> Option<Self> {
        Some(Self {
            ts_event: event_time(ts_event_nanos)?,
            price: price as f64 / PRICE_SCALE,
            size: size as u64,
            side,
        })
    }
}

/// Directional color assigned to a sealed bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvdColor {
    Green,
    Red,
    Gray,
}

impl std::fmt::Display for CvdColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvdColor::Green => write!(f, "GREEN"),
            CvdColor::Red => write!(f, "RED"),
            CvdColor::Gray => write!(f, "GRAY"),
        }
    }
}

/// Sealed 1-minute bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub minute_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    /// Buy volume minus sell volume within the bar
    pub delta: i64,
    /// Running CVD at the moment the bar was sealed
    pub cvd: i64,
    pub trade_count: u64,
    pub color: CvdColor,
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Breakout classification of the CVD series against its fitted band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakout {
    Bullish,
    Bearish,
    None,
}

impl Breakout {
    /// Direction a confirmed breakout would trade in
    pub fn direction(self) -> Option<Direction> {
        match self {
            Breakout::Bullish => Some(Direction::Long),
            Breakout::Bearish => Some(Direction::Short),
            Breakout::None => None,
        }
    }
}

impl std::fmt::Display for Breakout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Breakout::Bullish => write!(f, "BULLISH"),
            Breakout::Bearish => write!(f, "BEARISH"),
            Breakout::None => write!(f, "NONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Entry,
    StopLoss,
    TakeProfit,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Entry => "entry",
            DecisionKind::StopLoss => "stop_loss",
            DecisionKind::TakeProfit => "take_profit",
        }
    }
}

/// Entry or exit decision emitted by the risk manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub direction: Direction,
    /// Entry close for entries, the level that was hit for exits
    pub price: f64,
    pub stop: f64,
    pub target: f64,
    pub timestamp: DateTime<Utc>,
}

/// Everything the engine hands to downstream sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    BarSealed { index: u64, bar: Bar },
    Decision(Decision),
}

/// Handoff between the feed task and the consumer
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Trade(Trade),
    /// Feed ended or failed; the reason is fatal for the pipeline
    Terminated(String),
}
