// =============================================================================
// RSI strategy — oversold/overbought crosses with momentum follow-through
// =============================================================================
//
// Branches by window size (`period` = settings.rsi_period):
//
//   full      |w| >= period + 2   Wilder RSI; emit on threshold crosses and on
//                                 strong RSI momentum toward the far extreme.
//   shortened 3 <= |w| < period+2 RSI seeded over all available deltas,
//                                 aggressive thresholds 40/60.
//   two-tick  |w| = 2             pseudo-RSI = clamp(50 + pct_change * 10000,
//                                 5, 95), thresholds 40/60.
//   one-tick  |w| = 1             point parity: even => pseudo-RSI 25 (buy
//                                 side), odd => 75 (sell side).
//
// Confidence grows with threshold penetration depth; momentum signals carry
// the lower base.
// =============================================================================

use tracing::debug;

use crate::indicators::rsi::{rsi_series, rsi_shortened};
use crate::types::Side;

use super::{entry_price, percent_change, point_parity_side, Signal, StrategyCtx};

/// RSI-delta magnitude that counts as momentum in full mode.
const MOMENTUM_DELTA: f64 = 10.0;

/// Aggressive thresholds for the reduced branches.
const REDUCED_OVERSOLD: f64 = 40.0;
const REDUCED_OVERBOUGHT: f64 = 60.0;

/// Pseudo-RSI values assigned by the one-tick parity rule.
const PARITY_BUY_RSI: f64 = 25.0;
const PARITY_SELL_RSI: f64 = 75.0;

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();
    let period = ctx.settings.rsi_period.max(2);

    let signal = if n >= period + 2 {
        full_mode(ctx, &mids, period)
    } else if n >= 3 {
        reduced_mode(ctx, &mids)
    } else if n == 2 {
        two_tick_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "rsi: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "rsi: no signal");
    }
    signal
}

fn full_mode(ctx: &StrategyCtx<'_>, mids: &[f64], period: usize) -> Option<Signal> {
    let series = rsi_series(mids, period);
    let (&current, &previous) = match (series.last(), series.get(series.len().wrapping_sub(2))) {
        (Some(c), Some(p)) => (c, p),
        _ => return None,
    };

    let oversold = ctx.settings.rsi_oversold;
    let overbought = ctx.settings.rsi_overbought;
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "full",
        rsi = current,
        rsi_prev = previous,
        "rsi evaluated"
    );

    // Threshold crosses.
    if previous <= oversold && current > oversold {
        let depth = (oversold - previous).max(0.0) / oversold.max(1.0);
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.6 + 0.4 * depth,
            format!("RSI crossed up out of oversold ({previous:.1} -> {current:.1})"),
        ));
    }
    if previous >= overbought && current < overbought {
        let depth = (previous - overbought).max(0.0) / (100.0 - overbought).max(1.0);
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.6 + 0.4 * depth,
            format!("RSI crossed down out of overbought ({previous:.1} -> {current:.1})"),
        ));
    }

    // Momentum toward the opposite extreme.
    let delta = current - previous;
    if delta > MOMENTUM_DELTA && current < overbought {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.4 + (delta / 50.0).min(0.35),
            format!("RSI momentum up {delta:.1}"),
        ));
    }
    if delta < -MOMENTUM_DELTA && current > oversold {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.4 + (-delta / 50.0).min(0.35),
            format!("RSI momentum down {delta:.1}"),
        ));
    }

    None
}

fn reduced_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let value = rsi_shortened(mids)?;
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "shortened",
        rsi = value,
        "rsi evaluated"
    );
    signal_from_reduced_value(ctx, value, "shortened RSI")
}

fn two_tick_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let pct = percent_change(mids)?;
    let value = (50.0 + pct * 10_000.0).clamp(5.0, 95.0);
    debug!(
        symbol = ctx.symbol,
        window = 2,
        mode = "two_tick",
        rsi = value,
        pct_change = pct,
        "rsi evaluated"
    );
    signal_from_reduced_value(ctx, value, "two-tick pseudo-RSI")
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let value = match point_parity_side(mid, ctx.point_size) {
        Side::Buy => PARITY_BUY_RSI,
        Side::Sell => PARITY_SELL_RSI,
    };
    debug!(
        symbol = ctx.symbol,
        window = 1,
        mode = "one_tick",
        rsi = value,
        "rsi evaluated"
    );
    signal_from_reduced_value(ctx, value, "one-tick parity pseudo-RSI")
}

/// Map a reduced-branch RSI reading through the aggressive 40/60 thresholds.
fn signal_from_reduced_value(ctx: &StrategyCtx<'_>, value: f64, label: &str) -> Option<Signal> {
    if value <= REDUCED_OVERSOLD {
        let depth = (REDUCED_OVERSOLD - value) / REDUCED_OVERSOLD;
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + 0.5 * depth,
            format!("{label} {value:.1} below {REDUCED_OVERSOLD}"),
        ));
    }
    if value >= REDUCED_OVERBOUGHT {
        let depth = (value - REDUCED_OVERBOUGHT) / (100.0 - REDUCED_OVERBOUGHT);
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + 0.5 * depth,
            format!("{label} {value:.1} above {REDUCED_OVERBOUGHT}"),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorSettings;
    use crate::strategies::test_support::{quote, window_from_mids};

    fn ctx<'a>(
        settings: &'a IndicatorSettings,
        window: &'a crate::tick_pipeline::TickWindow,
        q: &'a crate::market_access::Quote,
    ) -> StrategyCtx<'a> {
        StrategyCtx {
            symbol: "ETHUSD",
            settings,
            window,
            quote: q,
            pip_size: 0.01,
            point_size: 0.01,
            invocation: 0,
        }
    }

    #[test]
    fn one_tick_parity_is_frozen() {
        let settings = IndicatorSettings::default();
        let q = quote(4300.00, 4300.50);

        // mid 4300.25 -> 430025 points, odd -> SELL at the bid.
        let window = window_from_mids(&[4300.25]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Sell);
        assert_eq!(signal.price, 4300.00);
        assert!(signal.confidence >= 0.5);

        // mid 4300.24 -> even -> BUY at the ask.
        let window = window_from_mids(&[4300.24]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Buy);
        assert_eq!(signal.price, 4300.50);
    }

    #[test]
    fn two_tick_pseudo_rsi_follows_the_move() {
        let settings = IndicatorSettings::default();
        let q = quote(100.0, 100.0);

        // +1% move -> pseudo-RSI pinned at 95 -> SELL side of 60.
        let window = window_from_mids(&[100.0, 101.0]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Sell);

        // -1% move -> pinned at 5 -> BUY.
        let window = window_from_mids(&[100.0, 99.0]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Buy);

        // Flat -> 50 -> suppressed.
        let window = window_from_mids(&[100.0, 100.0]);
        assert!(evaluate(&ctx(&settings, &window, &q)).is_none());
    }

    #[test]
    fn shortened_mode_uses_aggressive_thresholds() {
        let settings = IndicatorSettings::default();
        let q = quote(100.0, 100.0);

        // Five falling mids -> shortened RSI 0 -> BUY.
        let window = window_from_mids(&[104.0, 103.0, 102.0, 101.0, 100.0]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Buy);
        assert!(signal.confidence > 0.9);
    }

    #[test]
    fn full_mode_oversold_cross_buys() {
        let mut settings = IndicatorSettings::default();
        settings.rsi_period = 3;
        let q = quote(100.0, 100.1);

        // Falling run drives RSI to 0, then a pop crosses back above 30.
        let window = window_from_mids(&[106.0, 105.0, 104.0, 103.0, 102.0, 105.0]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Buy);
        assert_eq!(signal.price, 100.1);
        assert!(signal.confidence >= 0.6);
    }

    #[test]
    fn full_mode_overbought_cross_sells() {
        let mut settings = IndicatorSettings::default();
        settings.rsi_period = 3;
        let q = quote(100.0, 100.1);

        let window = window_from_mids(&[100.0, 101.0, 102.0, 103.0, 104.0, 101.0]);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Sell);
        assert_eq!(signal.price, 100.0);
    }

    #[test]
    fn quiet_full_window_is_suppressed() {
        let settings = IndicatorSettings::default();
        let q = quote(100.0, 100.1);
        let window = window_from_mids(&vec![100.0; 20]);
        assert!(evaluate(&ctx(&settings, &window, &q)).is_none());
    }
}
