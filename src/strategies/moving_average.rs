// =============================================================================
// Moving-average strategy — fast/slow SMA alignment with a near-cross band
// =============================================================================
//
// Branches by window size (`slow` = settings.ma_slow_period):
//
//   full      |w| >= slow   both SMAs; BUY when fast > slow and the last mid
//                           rides above the fast average, SELL symmetric.
//                           When the fast/slow gap sits inside the proximity
//                           band a lower-confidence signal leans with the gap.
//   two-point 2 <= |w|      sign of the percent change across the window.
//   one-tick  |w| = 1       point parity: even => BUY, odd => SELL, 0.5 conf.
// =============================================================================

use tracing::debug;

use crate::indicators::sma::sma_last;
use crate::types::Side;

use super::{entry_price, percent_change, point_parity_side, Signal, StrategyCtx};

/// Fast/slow gap (relative to the slow SMA) treated as "about to cross".
const NEAR_CROSS_BAND: f64 = 0.001;

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();
    let slow_period = ctx.settings.ma_slow_period.max(2);

    let signal = if n >= slow_period {
        full_mode(ctx, &mids)
    } else if n >= 2 {
        two_point_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "ma: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "ma: no signal");
    }
    signal
}

fn full_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let fast = sma_last(mids, ctx.settings.ma_fast_period.max(1))?;
    let slow = sma_last(mids, ctx.settings.ma_slow_period.max(2))?;
    let last = *mids.last()?;

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "full",
        fast,
        slow,
        last,
        "ma evaluated"
    );

    if slow == 0.0 {
        return None;
    }
    let gap = (fast - slow) / slow;

    if fast > slow && last > fast {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.6 + (gap.abs() * 200.0).min(0.3),
            format!("fast SMA {fast:.5} above slow {slow:.5}, close riding above"),
        ));
    }
    if fast < slow && last < fast {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.6 + (gap.abs() * 200.0).min(0.3),
            format!("fast SMA {fast:.5} below slow {slow:.5}, close riding below"),
        ));
    }

    // Near-cross: averages within the proximity band of each other.
    if gap.abs() < NEAR_CROSS_BAND && gap != 0.0 {
        let kind = if gap > 0.0 { Side::Buy } else { Side::Sell };
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.45,
            format!("fast/slow SMAs within near-cross band (gap {gap:+.5})"),
        ));
    }

    None
}

fn two_point_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let pct = percent_change(mids)?;
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "two_point",
        pct_change = pct,
        "ma evaluated"
    );

    if pct == 0.0 {
        return None;
    }
    let kind = if pct > 0.0 { Side::Buy } else { Side::Sell };
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.5 + (pct.abs() * 1000.0).min(0.3),
        format!("percent change {pct:+.5} over short window"),
    ))
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let kind = point_parity_side(mid, ctx.point_size);
    debug!(
        symbol = ctx.symbol,
        window = 1,
        mode = "one_tick",
        side = %kind,
        "ma evaluated"
    );
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.5,
        "one-tick point parity",
    ))
}
