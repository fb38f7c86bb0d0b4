// =============================================================================
// Shared types used across the TradePulse controller
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a signal or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite direction (used for manual close deals).
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1.0 for Buy, -1.0 for Sell. Used in pip-distance math.
    pub fn direction(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of a bot. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Running,
    PausedProtection,
    Stopped,
}

impl Default for BotStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::PausedProtection => write!(f, "PAUSED_PROTECTION"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Which trading loop a bot runs. This controller drives the HFT loop; the
/// candle loop lives behind the same config switch for the console's sake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    Hft,
    Candle,
}

impl Default for TradeMode {
    fn default() -> Self {
        Self::Hft
    }
}

impl std::fmt::Display for TradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hft => write!(f, "HFT"),
            Self::Candle => write!(f, "CANDLE"),
        }
    }
}

/// Bot identifier. Monotonically increasing, unique for the controller's
/// lifetime, and embedded in every order tag the bot places.
pub type BotId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_display_matches_tag_grammar() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn side_direction_signs() {
        assert_eq!(Side::Buy.direction(), 1.0);
        assert_eq!(Side::Sell.direction(), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn mode_display_matches_tag_grammar() {
        assert_eq!(TradeMode::Hft.to_string(), "HFT");
        assert_eq!(TradeMode::Candle.to_string(), "CANDLE");
    }

    #[test]
    fn status_display() {
        assert_eq!(BotStatus::PausedProtection.to_string(), "PAUSED_PROTECTION");
    }
}
