// =============================================================================
// Strategy Library — short-window indicator signals with progressive fallbacks
// =============================================================================
//
// Every strategy is a total function over window sizes from 1 up: when the
// window is too small for the full indicator, the strategy drops to a
// documented simplified branch instead of reporting insufficient data. The
// smallest branches share two frozen deterministic rules:
//
//   * point parity (|window| = 1): even `round(price / point_size)` reads
//     bullish, odd reads bearish;
//   * percent-change sign (|window| = 2).
//
// Each evaluation logs the window size it saw, the branch it took, the
// indicator value, and the emitted signal or the suppression reason.
// =============================================================================

pub mod always_signal;
pub mod bollinger;
pub mod breakout;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;
pub mod vwap;

use serde::Serialize;
use tracing::warn;

use crate::config::IndicatorSettings;
use crate::market_access::Quote;
use crate::tick_pipeline::TickWindow;
use crate::types::Side;

/// Registry names, as the console submits them.
pub const STRATEGY_NAMES: [&str; 8] = [
    "rsi",
    "moving_average",
    "macd",
    "stochastic",
    "breakout",
    "vwap",
    "bollinger",
    "always_signal",
];

/// A directional signal. Absence of a signal is `None` at the call site;
/// there are no sentinel prices.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub kind: Side,
    pub price: f64,
    pub confidence: f64,
    pub reason: String,
}

impl Signal {
    /// Confidence is clamped into [0, 1] at construction.
    pub fn new(kind: Side, price: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            price,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Everything one evaluation sees. Parameters are a snapshot of the bot's
/// config at loop entry; strategies keep no state between cycles.
pub struct StrategyCtx<'a> {
    pub symbol: &'a str,
    pub settings: &'a IndicatorSettings,
    pub window: &'a TickWindow,
    pub quote: &'a Quote,
    pub pip_size: f64,
    pub point_size: f64,
    /// The bot's cycle counter. Only `always_signal` reads it, for its
    /// deterministic BUY/SELL alternation.
    pub invocation: u64,
}

/// True when `name` resolves in the registry.
pub fn is_known(name: &str) -> bool {
    STRATEGY_NAMES.contains(&name.to_ascii_lowercase().as_str())
}

/// Resolve and run a strategy by name.
pub fn evaluate(name: &str, ctx: &StrategyCtx<'_>) -> Option<Signal> {
    match name.to_ascii_lowercase().as_str() {
        "rsi" => rsi::evaluate(ctx),
        "moving_average" => moving_average::evaluate(ctx),
        "macd" => macd::evaluate(ctx),
        "stochastic" => stochastic::evaluate(ctx),
        "breakout" => breakout::evaluate(ctx),
        "vwap" => vwap::evaluate(ctx),
        "bollinger" => bollinger::evaluate(ctx),
        "always_signal" => always_signal::evaluate(ctx),
        other => {
            warn!(strategy = other, "unknown strategy name; no signal");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Shared fallback rules
// ---------------------------------------------------------------------------

/// Frozen one-tick rule: parity of the nearest point index of the price.
/// Even => bullish, odd => bearish. Rounding to the nearest index keeps the
/// rule stable against one-ulp noise in the quotient.
pub(crate) fn point_parity_side(price: f64, point_size: f64) -> Side {
    if point_size <= 0.0 {
        return Side::Buy;
    }
    let points = (price / point_size).round() as i64;
    if points % 2 == 0 {
        Side::Buy
    } else {
        Side::Sell
    }
}

/// Entry-side price for a prospective signal: ask for BUY, bid for SELL.
pub(crate) fn entry_price(kind: Side, quote: &Quote) -> f64 {
    match kind {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    }
}

/// Percent change across a series; `None` when the base is zero or the series
/// has fewer than two points.
pub(crate) fn percent_change(mids: &[f64]) -> Option<f64> {
    let first = *mids.first()?;
    let last = *mids.last()?;
    if mids.len() < 2 || first == 0.0 {
        return None;
    }
    Some((last - first) / first)
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn registry_knows_all_names() {
        for name in STRATEGY_NAMES {
            assert!(is_known(name));
        }
        assert!(is_known("RSI"));
        assert!(!is_known("ml_strategy"));
    }

    #[test]
    fn confidence_is_clamped() {
        let s = Signal::new(Side::Buy, 1.0, 1.7, "x");
        assert_eq!(s.confidence, 1.0);
        let s = Signal::new(Side::Sell, 1.0, -0.2, "x");
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn point_parity_is_deterministic() {
        // 4300.25 at point 0.01 -> 430025 points -> odd -> Sell.
        assert_eq!(point_parity_side(4300.25, 0.01), Side::Sell);
        // 4300.24 -> 430024 -> even -> Buy.
        assert_eq!(point_parity_side(4300.24, 0.01), Side::Buy);
    }

    #[test]
    fn entry_side_follows_direction() {
        let quote = Quote {
            bid: 1.0,
            ask: 1.1,
            ts: Utc::now(),
        };
        assert_eq!(entry_price(Side::Buy, &quote), 1.1);
        assert_eq!(entry_price(Side::Sell, &quote), 1.0);
    }

    #[test]
    fn percent_change_edges() {
        assert!(percent_change(&[]).is_none());
        assert!(percent_change(&[1.0]).is_none());
        assert!(percent_change(&[0.0, 1.0]).is_none());
        assert!((percent_change(&[2.0, 3.0]).unwrap() - 0.5).abs() < 1e-12);
    }
}
