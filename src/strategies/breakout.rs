// =============================================================================
// Breakout strategy — rolling support/resistance with an approach band
// =============================================================================
//
// Branches by window size (`lookback`/`threshold` from settings):
//
//   full     |w| >= 3   support/resistance from the trailing `lookback` mids
//                       (capped at |w| − 1, the last mid is the probe). BUY on
//                       a close beyond resistance × (1 + threshold), SELL
//                       beyond support × (1 − threshold); an "approaching"
//                       close inside the threshold band emits at lower
//                       confidence.
//   two-tick |w| = 2    percent-change sign.
//   one-tick |w| = 1    point parity.
// =============================================================================

use tracing::debug;

use crate::types::Side;

use super::{entry_price, percent_change, point_parity_side, Signal, StrategyCtx};

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();

    let signal = if n >= 3 {
        level_mode(ctx, &mids)
    } else if n == 2 {
        two_tick_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "breakout: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "breakout: no signal");
    }
    signal
}

fn level_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let threshold = ctx.settings.breakout_threshold.max(1e-6);
    let lookback = ctx.settings.breakout_lookback.clamp(2, mids.len() - 1);

    let history = &mids[mids.len() - 1 - lookback..mids.len() - 1];
    let last = *mids.last()?;

    let (mut support, mut resistance) = (f64::INFINITY, f64::NEG_INFINITY);
    for &m in history {
        support = support.min(m);
        resistance = resistance.max(m);
    }

    let mode = if lookback < ctx.settings.breakout_lookback {
        "reduced"
    } else {
        "full"
    };
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode,
        support,
        resistance,
        last,
        "breakout evaluated"
    );

    if support <= 0.0 || resistance <= 0.0 {
        return None;
    }

    // Confirmed breakouts.
    if last > resistance * (1.0 + threshold) {
        let excess = last / resistance - 1.0 - threshold;
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.65 + (excess / threshold).min(1.0) * 0.25,
            format!("close {last:.5} broke resistance {resistance:.5}"),
        ));
    }
    if last < support * (1.0 - threshold) {
        let excess = 1.0 - threshold - last / support;
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.65 + (excess / threshold).min(1.0) * 0.25,
            format!("close {last:.5} broke support {support:.5}"),
        ));
    }

    // Approaching the level from inside the band.
    if last > resistance * (1.0 - threshold) && last <= resistance * (1.0 + threshold) {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.45,
            format!("close {last:.5} approaching resistance {resistance:.5}"),
        ));
    }
    if last < support * (1.0 + threshold) && last >= support * (1.0 - threshold) {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.45,
            format!("close {last:.5} approaching support {support:.5}"),
        ));
    }

    None
}

fn two_tick_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let pct = percent_change(mids)?;
    debug!(symbol = ctx.symbol, window = 2, mode = "two_tick", pct_change = pct, "breakout evaluated");
    if pct == 0.0 {
        return None;
    }
    let kind = if pct > 0.0 { Side::Buy } else { Side::Sell };
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.45 + (pct.abs() * 1000.0).min(0.25),
        format!("two-tick move {pct:+.5}"),
    ))
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let kind = point_parity_side(mid, ctx.point_size);
    debug!(symbol = ctx.symbol, window = 1, mode = "one_tick", side = %kind, "breakout evaluated");
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4,
        "one-tick point parity",
    ))
}
