// =============================================================================
// MACD strategy — EMA convergence/divergence with signal-line crosses
// =============================================================================
//
// Branches by window size (`fast`/`slow`/`signal` from settings):
//
//   full      |w| >= slow + signal   MACD = EMA_fast − EMA_slow over mids,
//                                    signal = EMA(MACD, signal). Emits on
//                                    signal-line crosses and zero-line crosses.
//   momentum  3 <= |w| < full        sign of the window delta, pip-scaled
//                                    confidence; always emits unless the
//                                    window is perfectly flat, where the
//                                    parity rule breaks the tie.
//   two-point |w| = 2                percent-change sign.
//   one-tick  |w| = 1                point parity.
// =============================================================================

use tracing::debug;

use crate::indicators::ema::ema_series;
use crate::types::Side;

use super::{entry_price, percent_change, point_parity_side, Signal, StrategyCtx};

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();

    let fast = ctx.settings.macd_fast.max(2);
    let slow = ctx.settings.macd_slow.max(fast + 1);
    let signal_period = ctx.settings.macd_signal.max(2);

    let result = if n >= slow + signal_period {
        full_mode(ctx, &mids, fast, slow, signal_period)
    } else if n >= 3 {
        momentum_mode(ctx, &mids)
    } else if n == 2 {
        two_point_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "macd: empty window");
        None
    };

    if result.is_none() {
        debug!(symbol = ctx.symbol, window = n, "macd: no signal");
    }
    result
}

fn full_mode(
    ctx: &StrategyCtx<'_>,
    mids: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<Signal> {
    let fast_series = ema_series(mids, fast);
    let slow_series = ema_series(mids, slow);
    if slow_series.is_empty() || fast_series.len() < slow_series.len() {
        return None;
    }

    // Align the two series on their shared tail.
    let offset = fast_series.len() - slow_series.len();
    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, &s)| fast_series[offset + i] - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal_period);
    if signal_line.len() < 2 {
        return None;
    }

    let macd_tail = &macd_line[macd_line.len() - 2..];
    let sig_tail = &signal_line[signal_line.len() - 2..];
    let (macd_prev, macd_now) = (macd_tail[0], macd_tail[1]);
    let (sig_prev, sig_now) = (sig_tail[0], sig_tail[1]);

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "full",
        macd = macd_now,
        signal = sig_now,
        "macd evaluated"
    );

    let histogram_pips = (macd_now - sig_now).abs() / ctx.pip_size.max(f64::MIN_POSITIVE);
    let cross_confidence = 0.6 + (histogram_pips / 20.0).min(0.3);

    // Signal-line crosses.
    if macd_prev <= sig_prev && macd_now > sig_now {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            cross_confidence,
            format!("MACD crossed above signal ({macd_now:+.6} vs {sig_now:+.6})"),
        ));
    }
    if macd_prev >= sig_prev && macd_now < sig_now {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            cross_confidence,
            format!("MACD crossed below signal ({macd_now:+.6} vs {sig_now:+.6})"),
        ));
    }

    // Zero-line crosses.
    if macd_prev <= 0.0 && macd_now > 0.0 {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55,
            format!("MACD crossed above zero ({macd_now:+.6})"),
        ));
    }
    if macd_prev >= 0.0 && macd_now < 0.0 {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55,
            format!("MACD crossed below zero ({macd_now:+.6})"),
        ));
    }

    None
}

fn momentum_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let delta = mids.last()? - mids.first()?;
    let delta_pips = delta / ctx.pip_size.max(f64::MIN_POSITIVE);

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "momentum",
        delta_pips,
        "macd evaluated"
    );

    // Loose thresholds: any measurable move emits; a dead-flat window defers
    // to the parity tie-break so the branch stays total.
    let kind = if delta > 0.0 {
        Side::Buy
    } else if delta < 0.0 {
        Side::Sell
    } else {
        point_parity_side(*mids.last()?, ctx.point_size)
    };

    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4 + (delta_pips.abs() / 50.0).min(0.4),
        format!("short-window momentum {delta_pips:+.1} pips"),
    ))
}

fn two_point_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let pct = percent_change(mids)?;
    debug!(
        symbol = ctx.symbol,
        window = 2,
        mode = "two_point",
        pct_change = pct,
        "macd evaluated"
    );
    if pct == 0.0 {
        return None;
    }
    let kind = if pct > 0.0 { Side::Buy } else { Side::Sell };
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4 + (pct.abs() * 1000.0).min(0.3),
        format!("two-point change {pct:+.5}"),
    ))
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let kind = point_parity_side(mid, ctx.point_size);
    debug!(symbol = ctx.symbol, window = 1, mode = "one_tick", side = %kind, "macd evaluated");
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4,
        "one-tick point parity",
    ))
}
