//! Offline fixed-tick-count bar report
//!
//! Trades come either from the Databento historical API or from a local
//! `*.trades.csv.zst` export and are cut into bars of exactly N trades.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use databento::{
    dbn::{SType, Schema, TradeMsg},
    historical::timeseries::GetRangeParams,
    HistoricalClient,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::types::{event_time, Side, PRICE_SCALE};

pub const DEFAULT_TICKS_PER_BAR: usize = 1000;
pub const DEFAULT_OUTPUT: &str = "mes_1000tick_eastern.csv";

/// A trade print as counted by the report. Prints with no aggressor
/// (`side == None`) still fill a bar slot and add to volume and VWAP.
#[derive(Debug, Clone, PartialEq)]
pub struct TickTrade {
    pub ts_event: DateTime<Utc>,
    pub price: f64,
    pub size: u64,
    pub side: Option<Side>,
}

impl TickTrade {
    /// Contribution to `cd`: +size for a buy aggressor, -size otherwise
    fn cd(&self) -> i64 {
        match self.side {
            Some(Side::Buy) => self.size as i64,
            _ => -(self.size as i64),
        }
    }

    /// Contribution to `cdv`: +size for a sell aggressor, -size otherwise
    fn cdv(&self) -> i64 {
        match self.side {
            Some(Side::Sell) => self.size as i64,
            _ => -(self.size as i64),
        }
    }
}

/// One bar of exactly `ticks_per_bar` trades
#[derive(Debug, Clone, PartialEq)]
pub struct TickBar {
    /// Event time of the last trade in the bar
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// Buy size minus all other size
    pub cd: i64,
    /// Sell size minus all other size
    pub cdv: i64,
    pub vwap: f64,
}

impl TickBar {
    fn from_chunk(chunk: &[TickTrade]) -> Option<Self> {
        let first = chunk.first()?;
        let last = chunk.last()?;

        let mut bar = TickBar {
            timestamp: last.ts_event,
            open: first.price,
            high: first.price,
            low: first.price,
            close: last.price,
            volume: 0,
            cd: 0,
            cdv: 0,
            vwap: 0.0,
        };
        let mut notional = 0.0;

        for trade in chunk {
            bar.high = bar.high.max(trade.price);
            bar.low = bar.low.min(trade.price);
            bar.volume += trade.size;
            bar.cd += trade.cd();
            bar.cdv += trade.cdv();
            notional += trade.price * trade.size as f64;
        }

        if bar.volume > 0 {
            bar.vwap = notional / bar.volume as f64;
        }
        Some(bar)
    }
}

/// Sort trades by event time and cut them into bars of `ticks_per_bar`.
/// A trailing partial bar is discarded.
pub fn build_tick_bars(mut trades: Vec<TickTrade>, ticks_per_bar: usize) -> Result<Vec<TickBar>, EngineError> {
    if ticks_per_bar == 0 {
        return Err(EngineError::InvalidConfig(
            "ticks_per_bar must be non-zero".to_string(),
        ));
    }

    trades.sort_by_key(|t| t.ts_event);

    let bars: Vec<TickBar> = trades
        .chunks_exact(ticks_per_bar)
        .filter_map(TickBar::from_chunk)
        .collect();

    debug!(
        "Built {} bars of {} ticks, dropped {} trailing trades",
        bars.len(),
        ticks_per_bar,
        trades.len() % ticks_per_bar
    );

    Ok(bars)
}

/// CSV layout of the report
#[derive(Debug, Serialize)]
struct TickBarRow {
    timestamp_eastern: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    cd: i64,
    cdv: i64,
    vwap: f64,
}

impl From<&TickBar> for TickBarRow {
    fn from(bar: &TickBar) -> Self {
        Self {
            timestamp_eastern: format_eastern(bar.timestamp),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            cd: bar.cd,
            cdv: bar.cdv,
            vwap: bar.vwap,
        }
    }
}

/// 12-hour US/Eastern timestamp, e.g. "May 07, 2025 10:30:15 AM"
pub fn format_eastern(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&New_York)
        .format("%b %d, %Y %I:%M:%S %p")
        .to_string()
}

pub fn write_tick_bars_csv<W: Write>(writer: W, bars: &[TickBar]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for bar in bars {
        csv_writer
            .serialize(TickBarRow::from(bar))
            .context("Failed to write tick bar row")?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_tick_bars_file(path: &Path, bars: &[TickBar]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_tick_bars_csv(file, bars)
}

/// CSV row structure matching Databento trades schema
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct CsvRow {
    ts_recv: String,
    ts_event: String,
    rtype: u8,
    publisher_id: u32,
    instrument_id: u64,
    action: String,
    side: String,
    depth: u8,
    price: f64,
    size: u64,
    flags: u32,
    ts_in_delta: i64,
    sequence: u64,
    symbol: String,
}

/// Parse trades from a zstd-compressed Databento CSV export.
///
/// Rows for other symbols (spreads, back months) are skipped when `symbol` is set.
/// Prints with no aggressor side are kept.
pub fn load_trades_zst(path: &Path, symbol: Option<&str>) -> Result<Vec<TickTrade>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;

    let decoder = zstd::stream::Decoder::new(file)
        .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;

    let mut csv_reader = csv::Reader::from_reader(BufReader::new(decoder));

    let mut trades = Vec::new();
    let mut no_side = 0u64;

    for result in csv_reader.deserialize() {
        let row: CsvRow = result.context("Failed to parse CSV row")?;

        if row.action != "T" {
            continue;
        }
        if symbol.is_some_and(|s| s != row.symbol) {
            continue;
        }

        let side = row.side.bytes().next().and_then(Side::from_aggressor);
        if side.is_none() {
            no_side += 1;
        }

        let ts_event = DateTime::parse_from_rfc3339(&row.ts_event)
            .with_context(|| format!("Failed to parse timestamp: {}", row.ts_event))?
            .with_timezone(&Utc);

        trades.push(TickTrade {
            ts_event,
            price: row.price,
            size: row.size,
            side,
        });
    }

    if no_side > 0 {
        debug!("{} trades have no aggressor side", no_side);
    }

    info!("Loaded {} trades from {:?}", trades.len(), path);
    Ok(trades)
}

fn to_offset_datetime(ts: DateTime<Utc>) -> Result<OffsetDateTime> {
    let nanos = ts
        .timestamp_nanos_opt()
        .with_context(|| format!("Timestamp out of range: {}", ts))?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|e| anyhow::anyhow!("Timestamp conversion error: {}", e))
}

/// Fetch trades for `symbol` between `start` and `end` from the historical API
pub async fn fetch_trades(
    api_key: &str,
    dataset: &str,
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TickTrade>> {
    info!("Fetching {} trades from Databento: {} to {}", symbol, start, end);

    let mut client = HistoricalClient::builder().key(api_key)?.build()?;

    let mut decoder = client
        .timeseries()
        .get_range(
            &GetRangeParams::builder()
                .dataset(dataset)
                .date_time_range((to_offset_datetime(start)?, to_offset_datetime(end)?))
                .symbols(symbol)
                .stype_in(SType::RawSymbol)
                .schema(Schema::Trades)
                .build(),
        )
        .await
        .context("Failed to fetch from Databento")?;

    let mut trades = Vec::new();
    let mut undefined_ts = 0u64;

    while let Some(record) = decoder.decode_record::<TradeMsg>().await? {
        let Some(ts_event) = event_time(record.hd.ts_event) else {
            undefined_ts += 1;
            continue;
        };
        trades.push(TickTrade {
            ts_event,
            price: record.price as f64 / PRICE_SCALE,
            size: record.size as u64,
            side: Side::from_aggressor(record.side as u8),
        });
    }

    if undefined_ts > 0 {
        debug!("Skipped {} trades with undefined ts_event", undefined_ts);
    }

    info!("Fetched {} trades", trades.len());
    Ok(trades)
}
