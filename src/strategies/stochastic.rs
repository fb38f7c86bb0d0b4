// =============================================================================
// Stochastic oscillator strategy — %K / %D crossings
// =============================================================================
//
// Branches by window size (`k`/`d` from settings):
//
//   full     |w| >= k + d   %K from the rolling high/low/close of the mids,
//                           %D = SMA(%K, d). Emits on %K/%D crossings, with
//                           confidence boosted inside the oversold/overbought
//                           zones.
//   reduced  2 <= |w| < k+d %K over the whole window, aggressive 35/65
//                           thresholds.
//   one-tick |w| = 1        parity pseudo-%K 25/75 against the same
//                           aggressive thresholds.
//
// A flat high/low range reads %K = 50 (no division blow-ups).
// =============================================================================

use tracing::debug;

use crate::indicators::sma::sma_series;
use crate::types::Side;

use super::{entry_price, point_parity_side, Signal, StrategyCtx};

const REDUCED_OVERSOLD: f64 = 35.0;
const REDUCED_OVERBOUGHT: f64 = 65.0;

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();
    let k_period = ctx.settings.stoch_k_period.max(2);
    let d_period = ctx.settings.stoch_d_period.max(2);

    let signal = if n >= k_period + d_period {
        full_mode(ctx, &mids, k_period, d_period)
    } else if n >= 2 {
        reduced_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "stochastic: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "stochastic: no signal");
    }
    signal
}

/// %K value of one trailing slice: position of the close inside the range.
fn percent_k(slice: &[f64]) -> f64 {
    let (mut low, mut high) = (f64::INFINITY, f64::NEG_INFINITY);
    for &v in slice {
        low = low.min(v);
        high = high.max(v);
    }
    let range = high - low;
    if range <= 0.0 {
        return 50.0;
    }
    (slice[slice.len() - 1] - low) / range * 100.0
}

fn full_mode(ctx: &StrategyCtx<'_>, mids: &[f64], k_period: usize, d_period: usize) -> Option<Signal> {
    let k_series: Vec<f64> = mids.windows(k_period).map(percent_k).collect();
    let d_series = sma_series(&k_series, d_period);
    if k_series.len() < 2 || d_series.len() < 2 {
        return None;
    }

    let (k_prev, k_now) = (k_series[k_series.len() - 2], k_series[k_series.len() - 1]);
    let (d_prev, d_now) = (d_series[d_series.len() - 2], d_series[d_series.len() - 1]);

    let oversold = ctx.settings.stoch_oversold;
    let overbought = ctx.settings.stoch_overbought;

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "full",
        percent_k = k_now,
        percent_d = d_now,
        "stochastic evaluated"
    );

    if k_prev <= d_prev && k_now > d_now {
        let zone_boost = (oversold - k_now).max(0.0) / oversold.max(1.0);
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + 0.4 * zone_boost,
            format!("%K crossed above %D ({k_now:.1} vs {d_now:.1})"),
        ));
    }
    if k_prev >= d_prev && k_now < d_now {
        let zone_boost = (k_now - overbought).max(0.0) / (100.0 - overbought).max(1.0);
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + 0.4 * zone_boost,
            format!("%K crossed below %D ({k_now:.1} vs {d_now:.1})"),
        ));
    }

    None
}

fn reduced_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let value = percent_k(mids);
    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "reduced",
        percent_k = value,
        "stochastic evaluated"
    );
    threshold_signal(ctx, value, "whole-window %K")
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let value = match point_parity_side(mid, ctx.point_size) {
        Side::Buy => 25.0,
        Side::Sell => 75.0,
    };
    debug!(
        symbol = ctx.symbol,
        window = 1,
        mode = "one_tick",
        percent_k = value,
        "stochastic evaluated"
    );
    threshold_signal(ctx, value, "parity pseudo-%K")
}

fn threshold_signal(ctx: &StrategyCtx<'_>, value: f64, label: &str) -> Option<Signal> {
    if value <= REDUCED_OVERSOLD {
        let depth = (REDUCED_OVERSOLD - value) / REDUCED_OVERSOLD;
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + 0.4 * depth,
            format!("{label} {value:.1} below {REDUCED_OVERSOLD}"),
        ));
    }
    if value >= REDUCED_OVERBOUGHT {
        let depth = (value - REDUCED_OVERBOUGHT) / (100.0 - REDUCED_OVERBOUGHT);
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + 0.4 * depth,
            format!("{label} {value:.1} above {REDUCED_OVERBOUGHT}"),
        ));
    }
    None
}
