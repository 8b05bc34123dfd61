//! Single-position risk state machine (Flat / Long / Short)

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::window::RollingWindow;
use crate::types::{Bar, Decision, DecisionKind, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

/// Currently open position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_price: f64,
    pub target_price: f64,
}

impl Position {
    fn pnl_points(&self, exit_price: f64) -> f64 {
        match self.direction {
            Direction::Long => exit_price - self.entry_price,
            Direction::Short => self.entry_price - exit_price,
        }
    }
}

/// Running outcome counters for the session
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskSummary {
    pub entries: u32,
    pub stop_losses: u32,
    pub take_profits: u32,
    /// Sum of exit-minus-entry in price points, signed by direction
    pub pnl_points: f64,
}

#[derive(Debug)]
pub struct RiskManager {
    reward_multiple: f64,
    position: Option<Position>,
    summary: RiskSummary,
}

impl RiskManager {
    pub fn new(reward_multiple: f64) -> Self {
        Self {
            reward_multiple,
            position: None,
            summary: RiskSummary::default(),
        }
    }

    pub fn state(&self) -> PositionState {
        match self.position.as_ref().map(|p| p.direction) {
            None => PositionState::Flat,
            Some(Direction::Long) => PositionState::Long,
            Some(Direction::Short) => PositionState::Short,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn summary(&self) -> &RiskSummary {
        &self.summary
    }

    /// Check the open position against a sealed bar. The stop is always
    /// checked before the target.
    pub fn evaluate_exit(&mut self, bar: &Bar) -> Option<Decision> {
        let pos = self.position.as_ref()?;

        let (kind, exit_price) = match pos.direction {
            Direction::Long => {
                if bar.low <= pos.stop_price {
                    (DecisionKind::StopLoss, pos.stop_price)
                } else if bar.high >= pos.target_price {
                    (DecisionKind::TakeProfit, pos.target_price)
                } else {
                    return None;
                }
            }
            Direction::Short => {
                if bar.high >= pos.stop_price {
                    (DecisionKind::StopLoss, pos.stop_price)
                } else if bar.low <= pos.target_price {
                    (DecisionKind::TakeProfit, pos.target_price)
                } else {
                    return None;
                }
            }
        };

        let pnl_points = pos.pnl_points(exit_price);
        let decision = Decision {
            kind,
            direction: pos.direction,
            price: exit_price,
            stop: pos.stop_price,
            target: pos.target_price,
            timestamp: bar.minute_start,
        };

        match kind {
            DecisionKind::StopLoss => self.summary.stop_losses += 1,
            _ => self.summary.take_profits += 1,
        }
        self.summary.pnl_points += pnl_points;

        debug!(
            "EXIT {:?}: {} @ {:.2} | P&L: {:+.2} pts",
            kind, decision.direction, exit_price, pnl_points
        );

        self.position = None;
        Some(decision)
    }

    /// Open a position at `bar.close` with the stop at the window's extreme close.
    ///
    /// Returns `None` if a position is already open.
    pub fn enter(&mut self, direction: Direction, bar: &Bar, window: &RollingWindow) -> Option<Decision> {
        if self.position.is_some() {
            return None;
        }

        let entry_price = bar.close;
        let (stop_price, target_price) = match direction {
            Direction::Long => {
                let stop = window.min_close().unwrap_or(entry_price);
                let risk = entry_price - stop;
                (stop, entry_price + risk * self.reward_multiple)
            }
            Direction::Short => {
                let stop = window.max_close().unwrap_or(entry_price);
                let risk = stop - entry_price;
                (stop, entry_price - risk * self.reward_multiple)
            }
        };

        self.position = Some(Position {
            direction,
            entry_price,
            entry_time: bar.minute_start,
            stop_price,
            target_price,
        });
        self.summary.entries += 1;

        debug!(
            "ENTRY: {} @ {:.2} | Stop: {:.2} | Target: {:.2}",
            direction, entry_price, stop_price, target_price
        );

        Some(Decision {
            kind: DecisionKind::Entry,
            direction,
            price: entry_price,
            stop: stop_price,
            target: target_price,
            timestamp: bar.minute_start,
        })
    }
}
