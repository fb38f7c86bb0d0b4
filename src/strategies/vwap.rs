// =============================================================================
// VWAP strategy — volume-proxied mean reversion bands
// =============================================================================
//
// Tick feeds here carry no volume, so each tick is weighted by the absolute
// mid move that produced it (|mid_i − mid_{i−1}|): busier prints weigh more.
// A perfectly quiet slice degrades to the unweighted mean.
//
// Branches by window size (`period`/`deviation_threshold` from settings):
//
//   full     |w| >= 3   VWAP and stddev over the trailing `period` mids
//                       before the last (the last mid is the probe); a probe
//                       beyond `deviation_threshold` standard deviations
//                       emits the mean-reversion side.
//   two-tick |w| = 2    reversion against the move's sign.
//   one-tick |w| = 1    point parity.
// =============================================================================

use tracing::debug;

use crate::indicators::bollinger::mean_stddev;
use crate::types::Side;

use super::{entry_price, percent_change, point_parity_side, Signal, StrategyCtx};

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();

    let signal = if n >= 3 {
        band_mode(ctx, &mids)
    } else if n == 2 {
        two_tick_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "vwap: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "vwap: no signal");
    }
    signal
}

/// Volume-proxied average price of `slice`. Falls back to the plain mean when
/// every proxy weight is zero.
fn proxied_vwap(slice: &[f64]) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for pair in slice.windows(2) {
        let weight = (pair[1] - pair[0]).abs();
        weighted_sum += weight * pair[1];
        weight_total += weight;
    }

    if weight_total > 0.0 {
        let vwap = weighted_sum / weight_total;
        return vwap.is_finite().then_some(vwap);
    }
    mean_stddev(slice).map(|(mean, _)| mean)
}

fn band_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let period = ctx.settings.vwap_period.max(2);

    // The last mid is the probe; the band is built from the ticks before it,
    // so a deviating print cannot drag the baseline toward itself.
    let history = &mids[..mids.len() - 1];
    let slice = if history.len() > period {
        &history[history.len() - period..]
    } else {
        history
    };

    let vwap = proxied_vwap(slice)?;
    let (_, stddev) = mean_stddev(slice)?;
    let last = *mids.last()?;
    let threshold = ctx.settings.vwap_deviation_threshold.max(0.1);

    let mode = if history.len() >= period { "full" } else { "reduced" };
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode,
        vwap,
        stddev,
        last,
        "vwap evaluated"
    );

    if stddev <= 0.0 {
        return None;
    }

    let z = (last - vwap) / stddev;
    if z <= -threshold {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + ((-z - threshold) / threshold).min(1.0) * 0.3,
            format!("close {z:+.2} sigma below VWAP {vwap:.5}"),
        ));
    }
    if z >= threshold {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + ((z - threshold) / threshold).min(1.0) * 0.3,
            format!("close {z:+.2} sigma above VWAP {vwap:.5}"),
        ));
    }

    None
}

/// Two ticks: lean against the move (reversion), skip a flat pair.
fn two_tick_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let pct = percent_change(mids)?;
    debug!(symbol = ctx.symbol, window = 2, mode = "two_tick", pct_change = pct, "vwap evaluated");
    if pct == 0.0 {
        return None;
    }
    let kind = if pct > 0.0 { Side::Sell } else { Side::Buy };
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.45,
        format!("reversion against two-tick move {pct:+.5}"),
    ))
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let kind = point_parity_side(mid, ctx.point_size);
    debug!(symbol = ctx.symbol, window = 1, mode = "one_tick", side = %kind, "vwap evaluated");
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4,
        "one-tick point parity",
    ))
}
