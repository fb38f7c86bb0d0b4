// =============================================================================
// Canonical ticks and the rolling tick window
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sanity floor for quoted prices. Rejects zero, negatives, and denormal junk
/// without constraining any real instrument class.
pub const MIN_SANE_PRICE: f64 = 1e-9;

/// A single normalized quote observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub ts: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// A tick is valid iff both sides are positive (above the sanity floor)
    /// and the book is not crossed.
    pub fn is_valid(&self) -> bool {
        self.bid > MIN_SANE_PRICE
            && self.ask > MIN_SANE_PRICE
            && self.ask >= self.bid
            && self.bid.is_finite()
            && self.ask.is_finite()
    }
}

/// An ordered, time-monotonic sequence of valid ticks.
///
/// Construction filters invalid ticks and sorts by timestamp, so every tick a
/// window holds satisfies `is_valid` and `ts` never decreases. Strategies must
/// be total over any length `>= 1`; an empty window is representable but the
/// acquisition ladder never hands one to a strategy.
#[derive(Debug, Clone, Default)]
pub struct TickWindow {
    ticks: Vec<Tick>,
}

impl TickWindow {
    /// Build a window from already-normalized ticks: drop invalid entries and
    /// restore time order.
    pub fn from_ticks(mut ticks: Vec<Tick>) -> Self {
        ticks.retain(Tick::is_valid);
        ticks.sort_by_key(|t| t.ts);
        Self { ticks }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn last(&self) -> Option<&Tick> {
        self.ticks.last()
    }

    pub fn bids(&self) -> Vec<f64> {
        self.ticks.iter().map(|t| t.bid).collect()
    }

    pub fn asks(&self) -> Vec<f64> {
        self.ticks.iter().map(|t| t.ask).collect()
    }

    /// Mid prices, the default series for strategy math.
    pub fn mids(&self) -> Vec<f64> {
        self.ticks.iter().map(Tick::mid).collect()
    }
}
