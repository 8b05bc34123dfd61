//! Real-time 1-minute bar aggregation with running CVD

use chrono::{DateTime, Timelike, Utc};

use super::cvd_color;
use crate::error::EngineError;
use crate::types::{Bar, Side, Trade};

/// Truncate a timestamp to the start of its minute
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// The bar currently being built
#[derive(Debug, Clone)]
struct BarBuilder {
    minute_start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    buy_volume: u64,
    sell_volume: u64,
    trade_count: u64,
}

impl BarBuilder {
    fn new(minute_start: DateTime<Utc>, price: f64, size: u64, side: Side) -> Self {
        let (buy_vol, sell_vol) = match side {
            Side::Buy => (size, 0),
            Side::Sell => (0, size),
        };
        Self {
            minute_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
            buy_volume: buy_vol,
            sell_volume: sell_vol,
            trade_count: 1,
        }
    }

    fn add_trade(&mut self, price: f64, size: u64, side: Side) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += size;
        match side {
            Side::Buy => self.buy_volume += size,
            Side::Sell => self.sell_volume += size,
        }
        self.trade_count += 1;
    }
}

/// Folds trades into minute bars.
///
/// Exactly one bar is open at a time. It is sealed when a trade from a later
/// minute arrives or when [`BarAggregator::force_seal`] is called after a
/// stretch of silence on the feed.
#[derive(Debug)]
pub struct BarAggregator {
    current_bar: Option<BarBuilder>,
    last_sealed_minute: Option<DateTime<Utc>>,
    running_cvd: i64,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    strong_color: bool,
}

impl BarAggregator {
    pub fn new(strong_color: bool) -> Self {
        Self {
            current_bar: None,
            last_sealed_minute: None,
            running_cvd: 0,
            prev_high: None,
            prev_low: None,
            strong_color,
        }
    }

    /// Process a trade and return the previous bar if this trade opened a new minute
    pub fn ingest(&mut self, trade: &Trade) -> Result<Option<Bar>, EngineError> {
        let minute = truncate_to_minute(trade.ts_event);
        let open_minute = self.current_bar.as_ref().map(|b| b.minute_start);

        // with no open bar, the last sealed minute is the floor
        if open_minute.is_none() {
            if let Some(sealed_minute) = self.last_sealed_minute {
                if minute < sealed_minute {
                    return Err(EngineError::OutOfOrderTrade {
                        open_minute: sealed_minute,
                        trade_minute: minute,
                    });
                }
            }
        }

        match open_minute {
            Some(open_minute) if minute < open_minute => Err(EngineError::OutOfOrderTrade {
                open_minute,
                trade_minute: minute,
            }),
            Some(open_minute) if minute == open_minute => {
                if let Some(bar) = self.current_bar.as_mut() {
                    bar.add_trade(trade.price, trade.size, trade.side);
                }
                self.running_cvd += trade.side.signed(trade.size);
                Ok(None)
            }
            _ => {
                let completed = self.seal();
                self.running_cvd += trade.side.signed(trade.size);
                self.current_bar = Some(BarBuilder::new(minute, trade.price, trade.size, trade.side));
                Ok(completed)
            }
        }
    }

    /// Seal the open bar as-is (no-data timeout)
    pub fn force_seal(&mut self) -> Option<Bar> {
        self.seal()
    }

    /// Running CVD across every trade seen, never reset
    pub fn running_cvd(&self) -> i64 {
        self.running_cvd
    }

    pub fn open_bar_minute(&self) -> Option<DateTime<Utc>> {
        self.current_bar.as_ref().map(|b| b.minute_start)
    }

    fn seal(&mut self) -> Option<Bar> {
        let builder = self.current_bar.take()?;
        let color = cvd_color::classify(
            builder.close,
            builder.open,
            self.prev_high,
            self.prev_low,
            self.strong_color,
        );

        self.prev_high = Some(builder.high);
        self.prev_low = Some(builder.low);
        self.last_sealed_minute = Some(builder.minute_start);

        Some(Bar {
            minute_start: builder.minute_start,
            open: builder.open,
            high: builder.high,
            low: builder.low,
            close: builder.close,
            volume: builder.volume,
            buy_volume: builder.buy_volume,
            sell_volume: builder.sell_volume,
            delta: builder.buy_volume as i64 - builder.sell_volume as i64,
            cvd: self.running_cvd,
            trade_count: builder.trade_count,
            color,
        })
    }
}
