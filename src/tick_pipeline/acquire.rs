// =============================================================================
// Tick acquisition ladder
// =============================================================================
//
// Produces the rolling window for one analysis cycle via strictly-ordered
// fallbacks, degrading gracefully instead of failing the cycle:
//
//   1. Range query [now − lookback, now], all ticks.
//   2. Same range, info-class (best bid/ask) ticks only.
//   3. "Last N" query, N derived from the lookback.
//   4. Short 10 s range repeat of (1).
//   5. One-element window synthesized from the current quote.
//
// A rung that errors, times out, or normalizes to an empty window falls
// through to the next. Only when the synthesized fallback also fails does the
// ladder report `MarketDataUnavailable`; the loop then skips the cycle.
// =============================================================================

use chrono::{Duration, Utc};
use tokio::time::timeout;
use tracing::debug;

use crate::errors::ControllerError;
use crate::market_access::{MarketAccess, Quote, RawTick, TickClass};

use super::normalize::try_extract_quote;
use super::window::{Tick, TickWindow};

/// Bound on any single market-access call inside the ladder.
const MARKET_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Span of the short-range rung.
const SHORT_RANGE_SECS: i64 = 10;

/// Bound for the "last N" rung, derived from the lookback.
fn last_n_bound(lookback_secs: u64) -> usize {
    (lookback_secs.saturating_mul(10)).clamp(10, 5000) as usize
}

/// Ladder rung that produced a window, for strategy/telemetry logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderRung {
    RangeAll,
    RangeInfo,
    LastN,
    ShortRange,
    SynthesizedQuote,
}

impl std::fmt::Display for LadderRung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RangeAll => write!(f, "range_all"),
            Self::RangeInfo => write!(f, "range_info"),
            Self::LastN => write!(f, "last_n"),
            Self::ShortRange => write!(f, "short_range"),
            Self::SynthesizedQuote => write!(f, "synthesized_quote"),
        }
    }
}

/// Run the ladder and return the first non-empty valid window.
pub async fn acquire_window(
    port: &dyn MarketAccess,
    symbol: &str,
    lookback_secs: u64,
    current_quote: &Quote,
) -> Result<(TickWindow, LadderRung), ControllerError> {
    let now = Utc::now();
    let from = now - Duration::seconds(lookback_secs as i64);

    // Rung 1: full range, all ticks.
    let rung1 = timeout(
        MARKET_CALL_TIMEOUT,
        port.ticks_range(symbol, from, now, TickClass::All),
    )
    .await;
    if let Some(window) = rung_window(symbol, LadderRung::RangeAll, rung1) {
        return Ok((window, LadderRung::RangeAll));
    }

    // Rung 2: full range, info-class ticks.
    let rung2 = timeout(
        MARKET_CALL_TIMEOUT,
        port.ticks_range(symbol, from, now, TickClass::Info),
    )
    .await;
    if let Some(window) = rung_window(symbol, LadderRung::RangeInfo, rung2) {
        return Ok((window, LadderRung::RangeInfo));
    }

    // Rung 3: last-N ticks since the lookback start.
    let count = last_n_bound(lookback_secs);
    let rung3 = timeout(MARKET_CALL_TIMEOUT, port.ticks_from(symbol, from, count)).await;
    if let Some(window) = rung_window(symbol, LadderRung::LastN, rung3) {
        return Ok((window, LadderRung::LastN));
    }

    // Rung 4: short range repeat.
    let short_from = now - Duration::seconds(SHORT_RANGE_SECS);
    let rung4 = timeout(
        MARKET_CALL_TIMEOUT,
        port.ticks_range(symbol, short_from, now, TickClass::All),
    )
    .await;
    if let Some(window) = rung_window(symbol, LadderRung::ShortRange, rung4) {
        return Ok((window, LadderRung::ShortRange));
    }

    // Rung 5: synthesize a one-element window from the current quote.
    let synthesized = Tick {
        ts: current_quote.ts,
        bid: current_quote.bid,
        ask: current_quote.ask,
    };
    let window = TickWindow::from_ticks(vec![synthesized]);
    if !window.is_empty() {
        debug!(symbol, rung = %LadderRung::SynthesizedQuote, "tick ladder degraded to quote");
        return Ok((window, LadderRung::SynthesizedQuote));
    }

    Err(ControllerError::MarketDataUnavailable(format!(
        "tick ladder exhausted for {symbol}"
    )))
}

/// Normalize one rung's response into a window; `None` falls through.
fn rung_window(
    symbol: &str,
    rung: LadderRung,
    response: Result<Result<Vec<RawTick>, ControllerError>, tokio::time::error::Elapsed>,
) -> Option<TickWindow> {
    let raw = match response {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            debug!(symbol, rung = %rung, error = %e, "tick ladder rung failed");
            return None;
        }
        Err(_) => {
            debug!(symbol, rung = %rung, "tick ladder rung timed out");
            return None;
        }
    };

    let total = raw.len();
    let ticks: Vec<Tick> = raw.iter().filter_map(try_extract_quote).collect();
    let window = TickWindow::from_ticks(ticks);

    if window.is_empty() {
        debug!(symbol, rung = %rung, raw = total, "tick ladder rung yielded no valid ticks");
        return None;
    }

    debug!(
        symbol,
        rung = %rung,
        raw = total,
        admitted = window.len(),
        "tick window acquired"
    );
    Some(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_access::testing::ScriptedTerminal;
    use crate::market_access::AttributedTick;
    use std::collections::HashMap;

    fn quote() -> Quote {
        Quote {
            bid: 4300.0,
            ask: 4300.5,
            ts: Utc::now(),
        }
    }

    fn raw_pair(bid: f64, ask: f64) -> RawTick {
        RawTick::Tuple {
            ts: Utc::now(),
            values: vec![bid, ask],
        }
    }

    #[test]
    fn last_n_bound_clamps() {
        assert_eq!(last_n_bound(1), 10);
        assert_eq!(last_n_bound(60), 600);
        assert_eq!(last_n_bound(100_000), 5000);
    }

    #[tokio::test]
    async fn first_rung_wins_when_populated() {
        let port = ScriptedTerminal::new();
        port.push_range_response(Ok(vec![raw_pair(1.0, 1.1), raw_pair(1.2, 1.3)]));

        let (window, rung) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(rung, LadderRung::RangeAll);
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn falls_through_to_info_class() {
        let port = ScriptedTerminal::new();
        port.push_range_response(Ok(Vec::new())); // rung 1: empty
        port.push_range_response(Ok(vec![raw_pair(1.0, 1.1)])); // rung 2

        let (_, rung) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(rung, LadderRung::RangeInfo);
    }

    #[tokio::test]
    async fn all_invalid_records_fall_through() {
        let port = ScriptedTerminal::new();
        // Rung 1 returns garbage only; rungs 2 and 4 empty; rung 3 delivers.
        port.push_range_response(Ok(vec![raw_pair(5.0, 4.0), raw_pair(0.0, 1.0)]));
        port.push_from_response(Ok(vec![raw_pair(2.0, 2.1)]));

        let (window, rung) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(rung, LadderRung::LastN);
        assert_eq!(window.len(), 1);
    }

    #[tokio::test]
    async fn rung_errors_are_not_fatal() {
        let port = ScriptedTerminal::new();
        port.push_range_response(Err(ControllerError::MarketDataUnavailable("down".into())));
        port.push_range_response(Err(ControllerError::MarketDataUnavailable("down".into())));
        port.push_from_response(Err(ControllerError::MarketDataUnavailable("down".into())));
        port.push_range_response(Ok(vec![RawTick::Attributed(AttributedTick {
            ts: Some(Utc::now()),
            bid: Some(9.0),
            ask: Some(9.1),
            ..AttributedTick::default()
        })]));

        let (_, rung) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(rung, LadderRung::ShortRange);
    }

    #[tokio::test]
    async fn synthesizes_from_quote_when_everything_is_empty() {
        let port = ScriptedTerminal::new();
        let (window, rung) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(rung, LadderRung::SynthesizedQuote);
        assert_eq!(window.len(), 1);
        assert!((window.mids()[0] - 4300.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_quote_exhausts_the_ladder() {
        let port = ScriptedTerminal::new();
        let bad = Quote {
            bid: 0.0,
            ask: 0.0,
            ts: Utc::now(),
        };
        let result = acquire_window(&port, "ETHUSD", 60, &bad).await;
        assert!(matches!(
            result,
            Err(ControllerError::MarketDataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn structured_records_pass_through_the_ladder() {
        let port = ScriptedTerminal::new();
        port.push_range_response(Ok(vec![RawTick::Structured {
            ts: Utc::now(),
            fields: HashMap::from([("bid".into(), 3.0), ("ask".into(), 3.1)]),
        }]));
        let (window, _) = acquire_window(&port, "ETHUSD", 60, &quote()).await.unwrap();
        assert_eq!(window.len(), 1);
    }
}
