// =============================================================================
// AlwaysSignal — deterministic exercise strategy for the downstream gates
// =============================================================================
//
// Alternates BUY/SELL on each invocation (even cycle counts buy, odd sell) at
// a fixed 0.9 confidence, pricing off the current quote. It never needs a
// window, so rate-limit and protection paths can be driven on demand.
// =============================================================================

use tracing::debug;

use crate::types::Side;

use super::{entry_price, Signal, StrategyCtx};

const FIXED_CONFIDENCE: f64 = 0.9;

pub fn evaluate(ctx: &StrategyCtx<'_>) -> Option<Signal> {
    let kind = if ctx.invocation % 2 == 0 {
        Side::Buy
    } else {
        Side::Sell
    };

    debug!(
        symbol = ctx.symbol,
        window = ctx.window.len(),
        mode = "alternating",
        invocation = ctx.invocation,
        side = %kind,
        "always_signal evaluated"
    );

    Some(Signal::new(
        kind,
        entry_price(kind, ctx.quote),
        FIXED_CONFIDENCE,
        format!("alternating test signal #{}", ctx.invocation),
    ))
}
