use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use cvd_trendlines::trading_core::{
    fit_trendlines, BarAggregator, RiskManager, RollingWindow, SignalFilterChain, TrendLine,
    TrendlineFit,
};
use cvd_trendlines::{
    Bar, Breakout, CvdColor, DecisionKind, Direction, PipelineEvent, Side, SignalEngine,
    StrategyConfig, Trade,
};

fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 7, 13, 30, 0).unwrap()
}

fn side(is_buy: bool) -> Side {
    if is_buy {
        Side::Buy
    } else {
        Side::Sell
    }
}

fn bar(i: usize, cvd: i64, close: f64, volume: u64, wick: f64) -> Bar {
    Bar {
        minute_start: session_start() + Duration::minutes(i as i64),
        open: close,
        high: close + wick,
        low: close - wick,
        close,
        volume,
        buy_volume: volume,
        sell_volume: 0,
        delta: 0,
        cvd,
        trade_count: 1,
        color: CvdColor::Gray,
    }
}

/// Prices on a quarter-point grid like MES
fn price() -> impl Strategy<Value = f64> {
    (20_000u32..24_000).prop_map(|ticks| ticks as f64 * 0.25)
}

proptest! {
    #[test]
    fn bar_matches_its_trades(
        trades in prop::collection::vec((price(), 1u64..50, any::<bool>()), 1..60)
    ) {
        let mut agg = BarAggregator::new(true);
        for (i, (p, size, is_buy)) in trades.iter().enumerate() {
            let trade = Trade {
                ts_event: session_start() + Duration::milliseconds(i as i64 * 500),
                price: *p,
                size: *size,
                side: side(*is_buy),
            };
            prop_assert!(agg.ingest(&trade).unwrap().is_none());
        }
        let bar = agg.force_seal().unwrap();

        let prices: Vec<f64> = trades.iter().map(|t| t.0).collect();
        let buys: i64 = trades.iter().filter(|t| t.2).map(|t| t.1 as i64).sum();
        let sells: i64 = trades.iter().filter(|t| !t.2).map(|t| t.1 as i64).sum();

        prop_assert_eq!(bar.open, prices[0]);
        prop_assert_eq!(bar.close, prices[prices.len() - 1]);
        prop_assert_eq!(bar.high, prices.iter().cloned().fold(f64::MIN, f64::max));
        prop_assert_eq!(bar.low, prices.iter().cloned().fold(f64::MAX, f64::min));
        prop_assert_eq!(bar.volume, trades.iter().map(|t| t.1).sum::<u64>());
        prop_assert_eq!(bar.delta, buys - sells);
        prop_assert_eq!(bar.cvd, buys - sells);
    }

    #[test]
    fn cvd_is_running_total_at_seal(
        trades in prop::collection::vec((0i64..3, 1u64..50, any::<bool>()), 1..120)
    ) {
        let mut agg = BarAggregator::new(true);
        let mut sealed = Vec::new();
        let mut minute = 0i64;
        let mut running = 0i64;
        let mut expected_at_seal = Vec::new();

        for (gap, size, is_buy) in &trades {
            minute += gap;
            let trade = Trade {
                ts_event: session_start() + Duration::minutes(minute),
                price: 5000.0,
                size: *size,
                side: side(*is_buy),
            };
            if let Some(bar) = agg.ingest(&trade).unwrap() {
                expected_at_seal.push(running);
                sealed.push(bar);
            }
            running += trade.side.signed(trade.size);
            prop_assert_eq!(agg.running_cvd(), running);
        }
        if let Some(bar) = agg.force_seal() {
            expected_at_seal.push(running);
            sealed.push(bar);
        }

        let cvds: Vec<i64> = sealed.iter().map(|b| b.cvd).collect();
        prop_assert_eq!(cvds, expected_at_seal);
        prop_assert_eq!(sealed.iter().map(|b| b.delta).sum::<i64>(), running);
    }

    #[test]
    fn trendlines_stay_on_their_side(values in prop::collection::vec(-5_000i64..5_000, 5)) {
        let values: Vec<f64> = values.into_iter().map(|v| v as f64).collect();
        let fit = fit_trendlines(&values, 0.001).unwrap();
        for (x, y) in values.iter().enumerate() {
            prop_assert!(fit.support.value_at(x) - y <= 1e-5);
            prop_assert!(y - fit.resistance.value_at(x) <= 1e-5);
        }
    }

    #[test]
    fn filter_chain_is_idempotent(
        closes in prop::collection::vec(price(), 5),
        volumes in prop::collection::vec(1u64..500, 5),
        support_slope in -5.0f64..5.0,
        resistance_slope in -5.0f64..5.0,
        breakout in prop_oneof![Just(Breakout::Bullish), Just(Breakout::Bearish), Just(Breakout::None)],
        last in prop_oneof![Just(None), Just(Some(Direction::Long)), Just(Some(Direction::Short))]
    ) {
        let mut window = RollingWindow::new(5);
        let bars: Vec<Bar> = closes
            .iter()
            .zip(&volumes)
            .enumerate()
            .map(|(i, (c, v))| bar(i, 0, *c, *v, 0.0))
            .collect();
        for b in &bars {
            window.push(b);
        }

        let fit = TrendlineFit {
            support: TrendLine { slope: support_slope, intercept: 0.0 },
            resistance: TrendLine { slope: resistance_slope, intercept: 0.0 },
            baseline_slope: 0.0,
            support_pivot: 0,
            resistance_pivot: 0,
            breakout,
        };

        let mut chain = SignalFilterChain::new();
        if let Some(direction) = last {
            chain.record_confirmed(direction);
        }

        let once = chain.apply(&fit, &window, &bars[4]);
        let twice = chain.apply_to(once.breakout, &fit, &window, &bars[4]);
        prop_assert_eq!(twice.breakout, once.breakout);
        if breakout == Breakout::None {
            prop_assert_eq!(once.breakout, Breakout::None);
        }
        // demote only
        prop_assert!(once.breakout == breakout || once.breakout == Breakout::None);
    }

    #[test]
    fn entries_alternate_and_respect_reward_multiple(
        steps in prop::collection::vec((-400i64..400, -4i32..5, 1u64..300, 0u32..8), 10..150)
    ) {
        let mut engine = SignalEngine::new(StrategyConfig::default()).unwrap();
        let mut cvd = 0i64;
        let mut close = 5000.0f64;
        let mut entries = Vec::new();

        for (i, (cvd_step, price_step, volume, wick)) in steps.iter().enumerate() {
            cvd += cvd_step;
            close += *price_step as f64 * 0.25;
            for event in engine.on_bar(bar(i, cvd, close, *volume, *wick as f64 * 0.25)) {
                if let PipelineEvent::Decision(d) = event {
                    if d.kind == DecisionKind::Entry {
                        entries.push(d);
                    }
                }
            }
        }

        for pair in entries.windows(2) {
            prop_assert_ne!(pair[0].direction, pair[1].direction);
        }
        for entry in &entries {
            let risk = (entry.price - entry.stop).abs();
            let reward = (entry.target - entry.price).abs();
            prop_assert!((reward - 2.0 * risk).abs() < 1e-9);
            match entry.direction {
                Direction::Long => prop_assert!(entry.stop <= entry.price && entry.target >= entry.price),
                Direction::Short => prop_assert!(entry.stop >= entry.price && entry.target <= entry.price),
            }
        }
    }

    #[test]
    fn stop_wins_over_target(
        closes in prop::collection::vec(price(), 2..6),
        entry_step in 1u32..40,
        overshoot in 0u32..20,
        is_long in any::<bool>()
    ) {
        let direction = if is_long { Direction::Long } else { Direction::Short };
        let mut window = RollingWindow::new(closes.len() + 1);
        for (i, c) in closes.iter().enumerate() {
            window.push(&bar(i, 0, *c, 1, 0.0));
        }
        let extreme = match direction {
            Direction::Long => closes.iter().cloned().fold(f64::MAX, f64::min),
            Direction::Short => closes.iter().cloned().fold(f64::MIN, f64::max),
        };
        let entry_close = match direction {
            Direction::Long => extreme + entry_step as f64 * 0.25,
            Direction::Short => extreme - entry_step as f64 * 0.25,
        };
        let entry_bar = bar(closes.len(), 0, entry_close, 1, 0.0);
        window.push(&entry_bar);

        let mut risk = RiskManager::new(2.0);
        let entry = risk.enter(direction, &entry_bar, &window).unwrap();

        // one bar that spans both the stop and the target
        let margin = overshoot as f64 * 0.25;
        let low = entry.stop.min(entry.target) - margin;
        let high = entry.stop.max(entry.target) + margin;
        let mut spanning = bar(closes.len() + 1, 0, entry_close, 1, 0.0);
        spanning.low = low;
        spanning.high = high;

        let exit = risk.evaluate_exit(&spanning).unwrap();
        prop_assert_eq!(exit.kind, DecisionKind::StopLoss);
        prop_assert_eq!(exit.price, entry.stop);
    }
}
