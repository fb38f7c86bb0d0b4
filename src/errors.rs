// =============================================================================
// Error taxonomy for the TradePulse controller
// =============================================================================
//
// Only `ConfigInvalid` and `MarketAccessUnavailable` ever leave the core (at
// `Supervisor::start`). Everything else is caught by the bot loop and turned
// into telemetry; a bot is terminated by `stop` and nothing else.
// =============================================================================

use thiserror::Error;

/// All failure kinds the controller distinguishes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControllerError {
    /// A required config field is missing or out of range. Rejected at start.
    #[error("invalid bot config: {0}")]
    ConfigInvalid(String),

    /// The market access port is not ready or does not know the symbol.
    /// Rejected at start.
    #[error("market access unavailable: {0}")]
    MarketAccessUnavailable(String),

    /// The tick ladder was exhausted or a market call timed out. The cycle is
    /// skipped and the loop continues.
    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),

    /// The spread gate tripped for this cycle.
    #[error("spread too wide: {points:.1} points (limit {limit})")]
    SpreadTooWide { points: f64, limit: i64 },

    /// The strategy produced no signal this cycle.
    #[error("no signal")]
    NoSignal,

    /// The signal's confidence fell below the configured threshold.
    #[error("signal confidence {confidence:.3} below threshold {threshold:.3}")]
    LowConfidence { confidence: f64, threshold: f64 },

    /// A protection gate tripped and the bot entered PAUSED_PROTECTION.
    #[error("protection paused: {0}")]
    ProtectionPaused(String),

    /// The broker refused SL/TP twice, even after the outward clamp retry.
    #[error("broker rejected stop distance for {symbol}")]
    StopDistanceRejected { symbol: String },

    /// The broker rejected the order for a reason that does not warrant a
    /// retry.
    #[error("order rejected ({retcode}): {message}")]
    OrderRejected { retcode: i32, message: String },

    /// The broker signalled an unsupported filling mode. The executor retries
    /// with the next mode; this surfaces only when all three are refused.
    #[error("no filling mode accepted for {symbol}")]
    FillingModeUnsupported { symbol: String },

    /// An unexpected condition. Reported as telemetry; the loop continues.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Short machine-readable kind label used in telemetry events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "ConfigInvalid",
            Self::MarketAccessUnavailable(_) => "MarketAccessUnavailable",
            Self::MarketDataUnavailable(_) => "MarketDataUnavailable",
            Self::SpreadTooWide { .. } => "SpreadTooWide",
            Self::NoSignal => "NoSignal",
            Self::LowConfidence { .. } => "LowConfidence",
            Self::ProtectionPaused(_) => "ProtectionPaused",
            Self::StopDistanceRejected { .. } => "StopDistanceRejected",
            Self::OrderRejected { .. } => "OrderRejected",
            Self::FillingModeUnsupported { .. } => "FillingModeUnsupported",
            Self::Internal(_) => "Internal",
        }
    }
}
