//! Configuration for the signal engine and the trade feed

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EngineError;

/// Strategy parameters for the CVD trendline engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Number of sealed bars in each trendline window
    pub window_size: usize,

    /// Breakout tolerance as a fraction of the resistance endpoint (0.001 = 0.1%)
    pub tolerance_pct: f64,

    /// Reward:risk multiple used to place the target
    pub reward_multiple: f64,

    /// Silence on the feed before the open bar is force-sealed
    pub no_data_timeout: Duration,

    /// Color bars against the previous bar's range instead of their own open
    pub strong_color: bool,

    /// Capacity of the feed -> engine handoff queue
    pub channel_capacity: usize,

    /// Forget the last confirmed direction whenever a position exits
    pub reset_reversal_on_exit: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            tolerance_pct: 0.001,
            reward_multiple: 2.0,
            no_data_timeout: Duration::from_secs(60),
            strong_color: true,
            channel_capacity: 10_000,
            reset_reversal_on_exit: false,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window_size < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if !self.tolerance_pct.is_finite() || self.tolerance_pct < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "tolerance_pct must be a non-negative number, got {}",
                self.tolerance_pct
            )));
        }
        if !(self.reward_multiple.is_finite() && self.reward_multiple > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "reward_multiple must be positive, got {}",
                self.reward_multiple
            )));
        }
        if self.no_data_timeout.is_zero() {
            return Err(EngineError::InvalidConfig(
                "no_data_timeout must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "channel_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Databento live subscription parameters
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_key: String,

    /// Dataset code (CME Globex MDP 3.0)
    pub dataset: String,

    /// Raw instrument symbol, e.g. "MESM5"
    pub symbol: String,
}

impl FeedConfig {
    pub fn new(api_key: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            dataset: "GLBX.MDP3".to_string(),
            symbol: symbol.into(),
        }
    }
}

/// Databento keys are "db-" followed by 29 characters
pub fn validate_api_key(key: &str) -> Result<(), EngineError> {
    if key.starts_with("db-") && key.len() == 32 {
        Ok(())
    } else {
        Err(EngineError::InvalidApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 5);
        assert_eq!(config.no_data_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = StrategyConfig {
            window_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            reward_multiple: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            tolerance_pct: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_format() {
        assert!(validate_api_key("db-ABCDEFGHIJKLMNOPQRSTUVWXYZ123").is_ok());
        assert!(validate_api_key("db-short").is_err());
        assert!(validate_api_key("xx-ABCDEFGHIJKLMNOPQRSTUVWXYZ123").is_err());
    }
}
