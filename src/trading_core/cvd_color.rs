//! CVD bar coloring

use crate::types::CvdColor;

/// Color a sealed bar.
///
/// In strong mode the close is compared against the previous bar's range;
/// without a previous bar (or with `strong` off) it falls back to close vs open.
pub fn classify(
    close: f64,
    open: f64,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    strong: bool,
) -> CvdColor {
    match (strong, prev_high, prev_low) {
        (true, Some(prev_high), Some(prev_low)) => {
            if close > prev_high {
                CvdColor::Green
            } else if close < prev_low {
                CvdColor::Red
            } else {
                CvdColor::Gray
            }
        }
        _ => {
            if close > open {
                CvdColor::Green
            } else if close < open {
                CvdColor::Red
            } else {
                CvdColor::Gray
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_mode_uses_open() {
        assert_eq!(classify(101.0, 100.0, Some(200.0), Some(50.0), false), CvdColor::Green);
        assert_eq!(classify(99.0, 100.0, None, None, false), CvdColor::Red);
        assert_eq!(classify(100.0, 100.0, None, None, false), CvdColor::Gray);
    }

    #[test]
    fn test_strong_mode_uses_previous_range() {
        assert_eq!(classify(105.0, 110.0, Some(104.0), Some(100.0), true), CvdColor::Green);
        assert_eq!(classify(99.0, 90.0, Some(104.0), Some(100.0), true), CvdColor::Red);
        // inside the previous range is gray even if the bar itself closed up
        assert_eq!(classify(102.0, 101.0, Some(104.0), Some(100.0), true), CvdColor::Gray);
    }

    #[test]
    fn test_strong_mode_without_previous_bar_falls_back() {
        assert_eq!(classify(102.0, 101.0, None, None, true), CvdColor::Green);
        assert_eq!(classify(100.0, 101.0, Some(104.0), None, true), CvdColor::Red);
    }
}
