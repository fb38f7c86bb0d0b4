// =============================================================================
// Bollinger-band strategy — fade the touches of the outer bands
// =============================================================================
//
// Branches by window size (`period`/`deviation` from settings):
//
//   full     |w| >= period  bands over the trailing period; BUY when the last
//                           mid sits in the lower tenth of the band span or
//                           below it, SELL mirrored at the top. Collapsed
//                           bands (flat window) suppress.
//   reduced  2 <= |w|       z-score of the last mid against the whole window;
//                           |z| >= 1 emits the reversion side.
//   one-tick |w| = 1        point parity.
// =============================================================================

use tracing::debug;

use crate::indicators::bollinger::{bands, mean_stddev};
use crate::types::Side;

use super::{entry_price, point_parity_side, Signal, StrategyCtx};

/// Fraction of the band span that counts as "near" an outer band.
const NEAR_BAND_FRACTION: f64 = 0.1;

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let mids = ctx.window.mids();
    let n = mids.len();
    let period = ctx.settings.bb_period.max(2);

    let signal = if n >= period {
        full_mode(ctx, &mids, period)
    } else if n >= 2 {
        reduced_mode(ctx, &mids)
    } else if n == 1 {
        one_tick_mode(ctx, mids[0])
    } else {
        debug!(symbol = ctx.symbol, window = 0, mode = "none", "bollinger: empty window");
        None
    };

    if signal.is_none() {
        debug!(symbol = ctx.symbol, window = n, "bollinger: no signal");
    }
    signal
}

fn full_mode(ctx: &StrategyCtx<'_>, mids: &[f64], period: usize) -> Option<Signal> {
    let b = bands(mids, period, ctx.settings.bb_deviation.max(0.5))?;
    let last = *mids.last()?;
    let span = b.upper - b.lower;

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "full",
        mean = b.mean,
        upper = b.upper,
        lower = b.lower,
        last,
        "bollinger evaluated"
    );

    if span <= 0.0 {
        return None;
    }

    let near = span * NEAR_BAND_FRACTION;
    if last <= b.lower + near {
        let depth = ((b.lower + near - last) / near).min(2.0);
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + depth * 0.15,
            format!("close {last:.5} at lower band {lower:.5}", lower = b.lower),
        ));
    }
    if last >= b.upper - near {
        let depth = ((last - (b.upper - near)) / near).min(2.0);
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.55 + depth * 0.15,
            format!("close {last:.5} at upper band {upper:.5}", upper = b.upper),
        ));
    }

    None
}

fn reduced_mode(ctx: &StrategyCtx<'_>, mids: &[f64]) -> Option<Signal> {
    let (mean, stddev) = mean_stddev(mids)?;
    let last = *mids.last()?;

    debug!(
        symbol = ctx.symbol,
        window = mids.len(),
        mode = "reduced",
        mean,
        stddev,
        last,
        "bollinger evaluated"
    );

    if stddev <= 0.0 {
        return None;
    }

    let z = (last - mean) / stddev;
    if z <= -1.0 {
        let kind = Side::Buy;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + ((-z - 1.0) / 2.0).min(0.3),
            format!("close {z:+.2} sigma below short-window mean"),
        ));
    }
    if z >= 1.0 {
        let kind = Side::Sell;
        return Some(Signal::new(
            kind,
            entry_price(kind, ctx.quote),
            0.5 + ((z - 1.0) / 2.0).min(0.3),
            format!("close {z:+.2} sigma above short-window mean"),
        ));
    }

    None
}

fn one_tick_mode(ctx: &StrategyCtx<'_>, mid: f64) -> Option<Signal> {
    let kind = point_parity_side(mid, ctx.point_size);
    debug!(symbol = ctx.symbol, window = 1, mode = "one_tick", side = %kind, "bollinger evaluated");
    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        0.4,
        "one-tick point parity",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorSettings;
    use crate::strategies::test_support::{quote, window_from_mids};

    fn small_settings() -> IndicatorSettings {
        let mut settings = IndicatorSettings::default();
        settings.bb_period = 6;
        settings.bb_deviation = 2.0;
        settings
    }

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
    fn drop_to_the_lower_band_buys() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let mids = vec![100.0, 100.2, 100.1, 99.9, 100.1, 98.5];
        let window = window_from_mids(&mids);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Buy);
    }

    #[test]
    fn pop_to_the_upper_band_sells() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let mids = vec![100.0, 99.8, 100.0, 100.1, 99.9, 101.5];
        let window = window_from_mids(&mids);
        let signal = evaluate(&ctx(&settings, &window, &q)).unwrap();
        assert_eq!(signal.kind, Side::Sell);
    }

    #[test]
    fn mid_band_is_suppressed() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let mids = vec![100.0, 100.4, 99.6, 100.2, 99.8, 100.0];
        let window = window_from_mids(&mids);
        assert!(evaluate(&ctx(&settings, &window, &q)).is_none());
    }

    #[test]
    fn flat_window_collapses_the_bands() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let window = window_from_mids(&vec![100.0; 6]);
        assert!(evaluate(&ctx(&settings, &window, &q)).is_none());
    }

    #[test]
    fn reduced_mode_uses_z_score() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let window = window_from_mids(&[100.0, 100.1, 100.0, 97.0]);
        assert_eq!(evaluate(&ctx(&settings, &window, &q)).unwrap().kind, Side::Buy);

        let window = window_from_mids(&[100.0, 99.9, 100.0, 103.0]);
        assert_eq!(evaluate(&ctx(&settings, &window, &q)).unwrap().kind, Side::Sell);
    }

    #[test]
    fn one_tick_parity() {
        let settings = small_settings();
        let q = quote(100.0, 100.1);

        let window = window_from_mids(&[4300.24]);
        assert_eq!(evaluate(&ctx(&settings, &window, &q)).unwrap().kind, Side::Buy);
    }
}
