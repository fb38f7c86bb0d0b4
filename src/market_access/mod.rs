// =============================================================================
// Market Access Port — abstract capability set of the broker terminal
// =============================================================================
//
// Everything the controller knows about the broker goes through this trait:
// symbol metadata, top-of-book quotes, tick history, open positions, and order
// submission. Bots hold `Arc<dyn MarketAccess>`, which keeps the terminal
// substitutable — the demo service runs on the simulated terminal and tests
// run on a scripted one.
//
// The port must be safe under concurrent calls from multiple bot tasks.
// =============================================================================

pub mod pip;
pub mod sim;

#[cfg(test)]
pub mod testing;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ControllerError;
use crate::types::Side;

// ---------------------------------------------------------------------------
// Metadata & quotes
// ---------------------------------------------------------------------------

/// Static symbol metadata. Pip math derives from `point_size` and `digits`;
/// never from hard-coded symbol tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Smallest quote increment.
    pub point_size: f64,
    /// Number of quote decimal digits (3/5-digit symbols use a 10x pip).
    pub digits: u32,
    /// Broker minimum SL/TP distance from the entry price, in points.
    pub stop_level_points: i64,
    /// Minimum volume increment, in lots.
    pub volume_step: f64,
}

/// Latest top-of-book observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub ts: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

// ---------------------------------------------------------------------------
// Raw tick records
// ---------------------------------------------------------------------------

/// Which tick class a history query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickClass {
    /// Every tick the terminal recorded.
    All,
    /// Best bid/ask updates only.
    Info,
}

/// Heterogeneous tick record shapes as the terminal returns them.
///
/// Real terminals hand back attribute-addressed records, string-keyed
/// structured records, or bare positional tuples depending on the query path.
/// The tick pipeline normalizes all three; nothing outside
/// `tick_pipeline::normalize` should match on these variants.
#[derive(Debug, Clone)]
pub enum RawTick {
    /// Record addressable by string field name.
    Structured {
        ts: DateTime<Utc>,
        fields: HashMap<String, f64>,
    },
    /// Record with named, possibly-absent attributes.
    Attributed(AttributedTick),
    /// Positional tuple: slot 0 is bid, slot 1 is ask.
    Tuple {
        ts: DateTime<Utc>,
        values: Vec<f64>,
    },
}

/// Attribute-shaped tick record. Any subset of the fields may be present.
#[derive(Debug, Clone, Default)]
pub struct AttributedTick {
    pub ts: Option<DateTime<Utc>>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub price: Option<f64>,
    pub last: Option<f64>,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

// ---------------------------------------------------------------------------
// Orders & positions
// ---------------------------------------------------------------------------

/// Broker-side execution policy, tried in order when the terminal refuses one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillingMode {
    Ioc,
    Fok,
    Return,
}

impl FillingMode {
    /// Retry ladder order.
    pub const LADDER: [FillingMode; 3] = [Self::Ioc, Self::Fok, Self::Return];
}

impl std::fmt::Display for FillingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
            Self::Return => write!(f, "RETURN"),
        }
    }
}

/// A market or close order as submitted to the terminal.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    /// Volume in broker lots.
    pub volume: f64,
    /// Requested fill price (ask for BUY, bid for SELL).
    pub price: f64,
    /// Absolute stop-loss price; `None` only for close deals.
    pub sl: Option<f64>,
    /// Absolute take-profit price; `None` only for close deals.
    pub tp: Option<f64>,
    pub filling_mode: FillingMode,
    /// Attribution tag (see `executor::build_order_comment`).
    pub comment: String,
    /// Position ticket this deal closes, if it is a close.
    pub closes_ticket: Option<u64>,
}

/// Broker response classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRetcode {
    /// Deal done; ticket assigned.
    Done,
    /// The requested filling mode is not supported for this symbol.
    InvalidFill,
    /// SL/TP violates the broker's minimum stop distance.
    InvalidStops,
    /// Any other rejection; raw broker code attached.
    Rejected(i32),
}

/// Result of an `order_send` round trip.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub retcode: OrderRetcode,
    pub ticket: Option<u64>,
    /// Actual executed price when the terminal reports one.
    pub executed_price: Option<f64>,
    /// Broker-reported realized profit (close deals only).
    pub profit: Option<f64>,
    pub message: Option<String>,
}

impl OrderResult {
    pub fn is_done(&self) -> bool {
        self.retcode == OrderRetcode::Done
    }
}

/// An open position as the terminal reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub comment: String,
    pub opened_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// The port
// ---------------------------------------------------------------------------

/// Abstract broker terminal capability set.
#[async_trait]
pub trait MarketAccess: Send + Sync {
    /// Static metadata for a symbol. `MarketAccessUnavailable` when the symbol
    /// is unknown.
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ControllerError>;

    /// Latest top-of-book quote.
    async fn current_quote(&self, symbol: &str) -> Result<Quote, ControllerError>;

    /// Historical ticks in `[from, to]`, restricted by class.
    async fn ticks_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        class: TickClass,
    ) -> Result<Vec<RawTick>, ControllerError>;

    /// Up to `count` ticks starting at `from`.
    async fn ticks_from(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<RawTick>, ControllerError>;

    /// Open positions, optionally filtered by symbol or ticket.
    async fn positions(
        &self,
        symbol: Option<&str>,
        ticket: Option<u64>,
    ) -> Result<Vec<PositionInfo>, ControllerError>;

    /// Submit a market or close order.
    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, ControllerError>;
}
