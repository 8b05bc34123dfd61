//! Support/resistance trendline fitting over the CVD window
//!
//! Each line is pinned to a pivot point of the window and its slope is found by
//! a step-halving local search that minimizes squared deviation from the window
//! while keeping the line on one side of every point:
//! - support never above any value
//! - resistance never below any value
//!
//! The search starts from the ordinary least squares slope. Pivots are the
//! points with the largest and smallest residual against that baseline, which
//! guarantees the starting line is feasible.

use tracing::trace;

use crate::types::Breakout;

/// Slack allowed on the one-sided constraint for floating point noise
const FEASIBILITY_TOLERANCE: f64 = 1e-5;

/// Initial search step, in slope units
const INITIAL_STEP: f64 = 1.0;

/// Search stops once the step falls below this, in slope units
const MIN_STEP: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Support,
    Resistance,
}

/// Straight line over window indices 0..N
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    fn through_pivot(slope: f64, pivot: usize, values: &[f64]) -> Self {
        Self {
            slope,
            intercept: values[pivot] - slope * pivot as f64,
        }
    }

    pub fn value_at(&self, x: usize) -> f64 {
        self.slope * x as f64 + self.intercept
    }

    /// Line evaluated at every index of a window of length `n`
    pub fn points(&self, n: usize) -> Vec<f64> {
        (0..n).map(|x| self.value_at(x)).collect()
    }
}

/// Result of fitting one window
#[derive(Debug, Clone, PartialEq)]
pub struct TrendlineFit {
    pub support: TrendLine,
    pub resistance: TrendLine,
    /// OLS slope the search started from
    pub baseline_slope: f64,
    pub support_pivot: usize,
    pub resistance_pivot: usize,
    pub breakout: Breakout,
}

/// Fit both trendlines and classify the last value.
///
/// Returns `None` for windows shorter than two values.
pub fn fit_trendlines(values: &[f64], tolerance_pct: f64) -> Option<TrendlineFit> {
    if values.len() < 2 {
        return None;
    }

    let baseline_slope = ols_slope(values);

    // Residuals against the baseline slope; the intercept does not move the arg-extremes
    let residuals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(x, y)| y - baseline_slope * x as f64)
        .collect();

    let resistance_pivot = arg_extreme(&residuals, |candidate, best| candidate > best);
    let support_pivot = arg_extreme(&residuals, |candidate, best| candidate < best);

    let support = optimize_slope(LineKind::Support, support_pivot, baseline_slope, values);
    let resistance = optimize_slope(LineKind::Resistance, resistance_pivot, baseline_slope, values);

    let breakout = classify_breakout(values, &support, &resistance, tolerance_pct);

    Some(TrendlineFit {
        support,
        resistance,
        baseline_slope,
        support_pivot,
        resistance_pivot,
        breakout,
    })
}

/// Classify the last window value against both line endpoints.
///
/// Bullish is checked first and wins when the value is within tolerance of
/// both lines.
pub fn classify_breakout(
    values: &[f64],
    support: &TrendLine,
    resistance: &TrendLine,
    tolerance_pct: f64,
) -> Breakout {
    let Some(&last) = values.last() else {
        return Breakout::None;
    };
    let last_idx = values.len() - 1;
    let resistance_end = resistance.value_at(last_idx);
    let support_end = support.value_at(last_idx);
    let tolerance = resistance_end.abs() * tolerance_pct;

    if last >= resistance_end - tolerance {
        Breakout::Bullish
    } else if last <= support_end + tolerance {
        Breakout::Bearish
    } else {
        Breakout::None
    }
}

/// Least squares slope of `values` against their indices
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x as f64 - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    if sxx == 0.0 {
        0.0
    } else {
        sxy / sxx
    }
}

/// Index of the first value that wins `better` against every other
fn arg_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, values[0]), |(best_idx, best), (idx, &value)| {
            if better(value, best) {
                (idx, value)
            } else {
                (best_idx, best)
            }
        })
        .0
}

/// Sum of squared deviations of the pivot line from the window, or `None`
/// when the line crosses to the wrong side of any point.
fn line_error(kind: LineKind, pivot: usize, slope: f64, values: &[f64]) -> Option<f64> {
    let line = TrendLine::through_pivot(slope, pivot, values);
    let mut sse = 0.0;

    for (x, y) in values.iter().enumerate() {
        let diff = line.value_at(x) - y;
        let infeasible = match kind {
            LineKind::Support => diff > FEASIBILITY_TOLERANCE,
            LineKind::Resistance => diff < -FEASIBILITY_TOLERANCE,
        };
        if infeasible {
            return None;
        }
        sse += diff * diff;
    }

    Some(sse)
}

fn optimize_slope(kind: LineKind, pivot: usize, init_slope: f64, values: &[f64]) -> TrendLine {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let slope_unit = (max - min) / values.len() as f64;

    let mut best_slope = init_slope;
    let Some(mut best_err) = line_error(kind, pivot, best_slope, values) else {
        // Only reachable through float noise at the pivot; keep the baseline
        trace!(?kind, pivot, "baseline line infeasible, keeping initial slope");
        return TrendLine::through_pivot(best_slope, pivot, values);
    };

    let mut step = INITIAL_STEP;
    let mut need_direction = true;
    let mut derivative = 0.0;
    let mut iterations = 0u32;

    while step > MIN_STEP {
        iterations += 1;

        if need_direction {
            // One-sided nudge: up by the minimum step, or down if up is infeasible.
            // An infeasible nudge both ways reads as a negative change.
            let nudged = line_error(kind, pivot, best_slope + slope_unit * MIN_STEP, values)
                .or_else(|| line_error(kind, pivot, best_slope - slope_unit * MIN_STEP, values));
            derivative = match nudged {
                Some(err) => err - best_err,
                None => -1.0 - best_err,
            };
            need_direction = false;
        }

        let trial = if derivative > 0.0 {
            best_slope - slope_unit * step
        } else {
            best_slope + slope_unit * step
        };

        match line_error(kind, pivot, trial, values) {
            Some(err) if err < best_err => {
                best_slope = trial;
                best_err = err;
                need_direction = true;
            }
            _ => step *= 0.5,
        }
    }

    trace!(?kind, pivot, best_slope, best_err, iterations, "slope search finished");
    TrendLine::through_pivot(best_slope, pivot, values)
}
