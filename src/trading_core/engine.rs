//! Per-bar signal pipeline: aggregate -> window -> fit -> filter -> risk
//!
//! `SignalEngine` owns every piece of mutable state and is driven from a single
//! consumer task; nothing here is shared across threads.

use tracing::debug;

use super::bars::BarAggregator;
use super::filters::SignalFilterChain;
use super::risk::{PositionState, RiskManager, RiskSummary};
use super::trendline::fit_trendlines;
use super::window::RollingWindow;
use crate::config::StrategyConfig;
use crate::error::EngineError;
use crate::types::{Bar, PipelineEvent, Trade};

pub struct SignalEngine {
    config: StrategyConfig,
    aggregator: BarAggregator,
    window: RollingWindow,
    filters: SignalFilterChain,
    risk: RiskManager,
    bars_sealed: u64,
}

impl SignalEngine {
    pub fn new(config: StrategyConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            aggregator: BarAggregator::new(config.strong_color),
            window: RollingWindow::new(config.window_size),
            filters: SignalFilterChain::new(),
            risk: RiskManager::new(config.reward_multiple),
            bars_sealed: 0,
            config,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn position_state(&self) -> PositionState {
        self.risk.state()
    }

    pub fn risk_summary(&self) -> &RiskSummary {
        self.risk.summary()
    }

    pub fn bars_sealed(&self) -> u64 {
        self.bars_sealed
    }

    pub fn running_cvd(&self) -> i64 {
        self.aggregator.running_cvd()
    }

    /// Feed one trade; returns the events of the bar it sealed, if any
    pub fn on_trade(&mut self, trade: &Trade) -> Result<Vec<PipelineEvent>, EngineError> {
        match self.aggregator.ingest(trade)? {
            Some(bar) => Ok(self.on_bar(bar)),
            None => Ok(Vec::new()),
        }
    }

    /// Force-seal the open bar after a stretch of silence on the feed
    pub fn flush_open_bar(&mut self) -> Vec<PipelineEvent> {
        match self.aggregator.force_seal() {
            Some(bar) => self.on_bar(bar),
            None => Vec::new(),
        }
    }

    /// Run a sealed bar through exit checks, the windows and the entry logic
    pub fn on_bar(&mut self, bar: Bar) -> Vec<PipelineEvent> {
        self.bars_sealed += 1;
        let mut events = vec![PipelineEvent::BarSealed {
            index: self.bars_sealed,
            bar: bar.clone(),
        }];

        // An exit consumes the bar
        if let Some(exit) = self.risk.evaluate_exit(&bar) {
            if self.config.reset_reversal_on_exit {
                self.filters.reset();
            }
            events.push(PipelineEvent::Decision(exit));
            return events;
        }

        self.window.push(&bar);

        if !self.window.is_full() {
            debug!(
                "Window filling: {}/{} bars",
                self.window.len(),
                self.window.capacity()
            );
            return events;
        }
        if !self.risk.is_flat() {
            return events;
        }

        let cvd = self.window.cvd_values();
        let Some(fit) = fit_trendlines(&cvd, self.config.tolerance_pct) else {
            return events;
        };

        let n = cvd.len();
        debug!(
            "Fit | baseline: {:.4} | support: slope {:.4} pivot {} end {:.2} | resistance: slope {:.4} pivot {} end {:.2} | CVD: {:.0} | {}",
            fit.baseline_slope,
            fit.support.slope,
            fit.support_pivot,
            fit.support.value_at(n - 1),
            fit.resistance.slope,
            fit.resistance_pivot,
            fit.resistance.value_at(n - 1),
            cvd[n - 1],
            fit.breakout
        );

        let outcome = self.filters.apply(&fit, &self.window, &bar);
        if let Some(stage) = outcome.rejected_by {
            debug!("{} breakout rejected by {} filter", fit.breakout, stage);
        }

        if let Some(direction) = outcome.confirmed() {
            if let Some(entry) = self.risk.enter(direction, &bar, &self.window) {
                self.filters.record_confirmed(direction);
                events.push(PipelineEvent::Decision(entry));
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decision, DecisionKind, Direction, Side};
    use chrono::{Duration, TimeZone, Utc};

    fn config() -> StrategyConfig {
        StrategyConfig {
            window_size: 3,
            ..Default::default()
        }
    }

    /// Sealed bar `i` minutes after the session start
    fn bar(i: i64, cvd: i64, close: f64, volume: u64) -> Bar {
        Bar {
            minute_start: Utc.with_ymd_and_hms(2025, 5, 7, 14, 0, 0).unwrap() + Duration::minutes(i),
            open: close,
            high: close + 0.25,
            low: close - 0.25,
            close,
            volume,
            buy_volume: volume,
            sell_volume: 0,
            delta: 0,
            cvd,
            trade_count: 1,
            color: crate::types::CvdColor::Gray,
        }
    }

    fn decisions(events: &[PipelineEvent]) -> Vec<Decision> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Decision(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = StrategyConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(SignalEngine::new(config).is_err());
    }

    #[test]
    fn test_no_signal_until_window_full() {
        let mut engine = SignalEngine::new(config()).unwrap();
        let events = engine.on_bar(bar(0, 0, 100.0, 10));
        assert_eq!(events.len(), 1);
        let events = engine.on_bar(bar(1, 100, 101.0, 20));
        assert!(decisions(&events).is_empty());
        assert_eq!(engine.bars_sealed(), 2);
    }

    #[test]
    fn test_bullish_entry_then_take_profit() {
        let mut engine = SignalEngine::new(config()).unwrap();
        engine.on_bar(bar(0, 0, 100.0, 10));
        engine.on_bar(bar(1, 1, 100.5, 10));
        // CVD jumps to a new high with a new high close on higher volume
        let events = engine.on_bar(bar(2, 10, 101.0, 20));
        let entries = decisions(&events);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DecisionKind::Entry);
        assert_eq!(entries[0].direction, Direction::Long);
        assert_eq!(entries[0].stop, 100.0);
        assert_eq!(entries[0].target, 103.0);
        assert_eq!(engine.position_state(), PositionState::Long);

        // no new entries while long, even on another breakout
        let events = engine.on_bar(bar(3, 30, 101.5, 40));
        assert!(decisions(&events).is_empty());

        let events = engine.on_bar(bar(4, 31, 103.0, 10));
        let exits = decisions(&events);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].kind, DecisionKind::TakeProfit);
        assert_eq!(exits[0].price, 103.0);
        assert_eq!(engine.position_state(), PositionState::Flat);
        assert_eq!(engine.risk_summary().take_profits, 1);
    }

    #[test]
    fn test_exit_bar_is_not_evaluated_for_entry() {
        let mut engine = SignalEngine::new(config()).unwrap();
        engine.on_bar(bar(0, 0, 100.0, 10));
        engine.on_bar(bar(1, 1, 100.5, 10));
        engine.on_bar(bar(2, 10, 101.0, 20));

        // stop hit on a bar that would itself look like a bearish breakout
        let events = engine.on_bar(bar(3, -50, 99.0, 100));
        let exits = decisions(&events);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].kind, DecisionKind::StopLoss);
        assert_eq!(engine.position_state(), PositionState::Flat);
    }

    #[test]
    fn test_reversal_kept_across_exit_by_default() {
        let mut engine = SignalEngine::new(config()).unwrap();
        engine.on_bar(bar(0, 0, 100.0, 10));
        engine.on_bar(bar(1, 1, 100.5, 10));
        engine.on_bar(bar(2, 10, 101.0, 20));
        engine.on_bar(bar(3, 11, 103.0, 10));
        assert_eq!(engine.position_state(), PositionState::Flat);

        // another bullish breakout right after the exit is suppressed
        engine.on_bar(bar(4, 12, 103.0, 10));
        let events = engine.on_bar(bar(5, 40, 104.0, 50));
        assert!(decisions(&events).is_empty());
    }

    #[test]
    fn test_reversal_reset_on_exit() {
        let mut engine = SignalEngine::new(StrategyConfig {
            reset_reversal_on_exit: true,
            ..config()
        })
        .unwrap();
        engine.on_bar(bar(0, 0, 100.0, 10));
        engine.on_bar(bar(1, 1, 100.5, 10));
        engine.on_bar(bar(2, 10, 101.0, 20));
        engine.on_bar(bar(3, 11, 103.0, 10));

        engine.on_bar(bar(4, 12, 103.0, 10));
        let events = engine.on_bar(bar(5, 40, 104.0, 50));
        let entries = decisions(&events);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].direction, Direction::Long);
    }

    #[test]
    fn test_on_trade_seals_on_minute_change() {
        let mut engine = SignalEngine::new(config()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 5, 7, 14, 0, 5).unwrap();
        let trade = |ts, side| Trade {
            ts_event: ts,
            price: 100.0,
            size: 2,
            side,
        };

        assert!(engine.on_trade(&trade(t0, Side::Buy)).unwrap().is_empty());
        let events = engine
            .on_trade(&trade(t0 + Duration::seconds(60), Side::Sell))
            .unwrap();
        match &events[0] {
            PipelineEvent::BarSealed { index, bar } => {
                assert_eq!(*index, 1);
                assert_eq!(bar.cvd, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(engine.running_cvd(), 0);

        let err = engine.on_trade(&trade(t0, Side::Buy)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderTrade { .. }));

        let flushed = engine.flush_open_bar();
        assert_eq!(flushed.len(), 1);
        assert!(engine.flush_open_bar().is_empty());
        assert_eq!(engine.bars_sealed(), 2);
    }
}
