//! Breakout confirmation filters
//!
//! Stages run in a fixed order and can only demote a breakout to
//! [`Breakout::None`], never promote one.

use super::trendline::TrendlineFit;
use super::window::RollingWindow;
use crate::types::{Bar, Breakout, Direction};

/// Confirmation stage, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Breakout must differ from the last confirmed direction
    Reversal,
    /// Resistance must rise for longs, support must fall for shorts
    Slope,
    /// Close must clear every prior close in the window
    PriceConfirmation,
    /// Volume must beat the prior bars' average
    VolumeConfirmation,
}

impl FilterStage {
    pub const ORDER: [FilterStage; 4] = [
        FilterStage::Reversal,
        FilterStage::Slope,
        FilterStage::PriceConfirmation,
        FilterStage::VolumeConfirmation,
    ];
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStage::Reversal => write!(f, "reversal"),
            FilterStage::Slope => write!(f, "slope"),
            FilterStage::PriceConfirmation => write!(f, "price"),
            FilterStage::VolumeConfirmation => write!(f, "volume"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOutcome {
    pub breakout: Breakout,
    /// First stage that demoted the breakout, if any
    pub rejected_by: Option<FilterStage>,
}

impl FilterOutcome {
    /// Direction of a breakout that survived every stage
    pub fn confirmed(&self) -> Option<Direction> {
        self.breakout.direction()
    }
}

/// Filter chain plus the last confirmed direction it alternates against
#[derive(Debug, Default)]
pub struct SignalFilterChain {
    last_signal: Option<Direction>,
}

impl SignalFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_signal(&self) -> Option<Direction> {
        self.last_signal
    }

    /// Remember a confirmed entry direction for the reversal stage
    pub fn record_confirmed(&mut self, direction: Direction) {
        self.last_signal = Some(direction);
    }

    pub fn reset(&mut self) {
        self.last_signal = None;
    }

    /// Run the fitted breakout through every stage
    pub fn apply(&self, fit: &TrendlineFit, window: &RollingWindow, bar: &Bar) -> FilterOutcome {
        self.apply_to(fit.breakout, fit, window, bar)
    }

    /// Run an arbitrary breakout through every stage against `fit`
    pub fn apply_to(
        &self,
        breakout: Breakout,
        fit: &TrendlineFit,
        window: &RollingWindow,
        bar: &Bar,
    ) -> FilterOutcome {
        if breakout == Breakout::None {
            return FilterOutcome {
                breakout,
                rejected_by: None,
            };
        }

        for stage in FilterStage::ORDER {
            if !self.passes(stage, breakout, fit, window, bar) {
                return FilterOutcome {
                    breakout: Breakout::None,
                    rejected_by: Some(stage),
                };
            }
        }

        FilterOutcome {
            breakout,
            rejected_by: None,
        }
    }

    fn passes(
        &self,
        stage: FilterStage,
        breakout: Breakout,
        fit: &TrendlineFit,
        window: &RollingWindow,
        bar: &Bar,
    ) -> bool {
        match stage {
            FilterStage::Reversal => breakout.direction() != self.last_signal,
            FilterStage::Slope => match breakout {
                Breakout::Bullish => fit.resistance.slope > 0.0,
                Breakout::Bearish => fit.support.slope < 0.0,
                Breakout::None => false,
            },
            FilterStage::PriceConfirmation => match breakout {
                Breakout::Bullish => window
                    .prior_closes()
                    .reduce(f64::max)
                    .is_some_and(|max| bar.close > max),
                Breakout::Bearish => window
                    .prior_closes()
                    .reduce(f64::min)
                    .is_some_and(|min| bar.close < min),
                Breakout::None => false,
            },
            FilterStage::VolumeConfirmation => window
                .prior_volume_average()
                .is_some_and(|avg| bar.volume as f64 > avg),
        }
    }
}
