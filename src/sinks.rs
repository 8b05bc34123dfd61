//! Downstream consumers of sealed bars and trade decisions

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::types::{Bar, Decision, DecisionKind, PipelineEvent};

/// Receives every event the engine produces, in order
pub trait EventSink {
    fn emit(&mut self, event: &PipelineEvent);
}

/// Collects events in memory
impl EventSink for Vec<PipelineEvent> {
    fn emit(&mut self, event: &PipelineEvent) {
        self.push(event.clone());
    }
}

/// Console presentation through `tracing`, bar times shown in `display_tz`
pub struct LogSink {
    display_tz: Tz,
}

impl LogSink {
    pub fn new(display_tz: Tz) -> Self {
        Self { display_tz }
    }

    pub fn format_bar(&self, index: u64, bar: &Bar) -> String {
        let local = bar.minute_start.with_timezone(&self.display_tz);
        format!(
            "#{:03} {} | O:{:.2} H:{:.2} L:{:.2} C:{:.2} | Vol:{} | CVD:{} | {}",
            index,
            local.format("%I:%M:%S %p"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.cvd,
            bar.color
        )
    }

    pub fn format_decision(&self, decision: &Decision) -> String {
        match decision.kind {
            DecisionKind::Entry => format!(
                "ENTRY {} @ {:.2} | Stop: {:.2} | Target: {:.2}",
                decision.direction, decision.price, decision.stop, decision.target
            ),
            DecisionKind::StopLoss => format!(
                "EXIT {} via STOP LOSS @ {:.2}",
                decision.direction, decision.price
            ),
            DecisionKind::TakeProfit => format!(
                "EXIT {} via TAKE PROFIT @ {:.2}",
                decision.direction, decision.price
            ),
        }
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::BarSealed { index, bar } => info!("{}", self.format_bar(*index, bar)),
            PipelineEvent::Decision(decision) => info!("{}", self.format_decision(decision)),
        }
    }
}

/// One JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &PipelineEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &PipelineEvent) {
        if let Err(e) = self.write_event(event) {
            warn!("Failed to write JSON event: {}", e);
        }
    }
}

#[derive(Debug, Serialize)]
struct JournalRow<'a> {
    timestamp: String,
    kind: &'a str,
    direction: String,
    price: f64,
    stop: f64,
    target: f64,
}

/// Append-only CSV log of entries and exits
pub struct DecisionJournal {
    writer: csv::Writer<File>,
}

impl DecisionJournal {
    /// Open `path` for appending; the header is only written to an empty file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to stat journal {}", path.display()))?
            .len()
            == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        Ok(Self { writer })
    }

    fn append(&mut self, decision: &Decision) -> Result<()> {
        self.writer.serialize(JournalRow {
            timestamp: decision.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: decision.kind.as_str(),
            direction: decision.direction.to_string(),
            price: decision.price,
            stop: decision.stop,
            target: decision.target,
        })?;
        self.writer.flush()?;
        Ok(())
    }
}

impl EventSink for DecisionJournal {
    fn emit(&mut self, event: &PipelineEvent) {
        if let PipelineEvent::Decision(decision) = event {
            if let Err(e) = self.append(decision) {
                warn!("Failed to write decision journal: {}", e);
            }
        }
    }
}

/// Fans each event out to every registered sink
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl EventSink + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for SinkSet {
    fn emit(&mut self, event: &PipelineEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }
}
