// =============================================================================
// Bot & Controller Configuration — serde-defaulted, hot-reload friendly
// =============================================================================
//
// Every tunable carries `#[serde(default)]` so that older console payloads and
// config files keep deserialising as fields are added. The SL/TP pip fields
// also accept the legacy names (`sl_pips`/`stopLoss`, `tp_pips`/`takeProfit`)
// still emitted by older console builds.
//
// A config is validated once, at `Supervisor::start`; the running loop works
// from an immutable per-cycle snapshot.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ControllerError;
use crate::types::TradeMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_strategy_name() -> String {
    "rsi".to_string()
}

fn default_analysis_interval_secs() -> u64 {
    5
}

fn default_tick_lookback_secs() -> u64 {
    60
}

fn default_min_signal_confidence() -> f64 {
    0.5
}

fn default_lot_size_per_trade() -> f64 {
    0.01
}

fn default_stop_loss_pips() -> f64 {
    20.0
}

fn default_take_profit_pips() -> f64 {
    40.0
}

fn default_risk_reward_ratio() -> f64 {
    2.0
}

fn default_max_daily_trades() -> u32 {
    50
}

fn default_max_orders_per_minute() -> u32 {
    10
}

fn default_cooldown_secs_after_trade() -> u64 {
    5
}

fn default_max_loss_threshold() -> f64 {
    100.0
}

fn default_max_profit_threshold() -> f64 {
    200.0
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_max_consecutive_profits() -> u32 {
    10
}

// =============================================================================
// IndicatorSettings
// =============================================================================

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_ma_fast_period() -> usize {
    5
}

fn default_ma_slow_period() -> usize {
    20
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_stoch_k_period() -> usize {
    14
}

fn default_stoch_d_period() -> usize {
    3
}

fn default_stoch_oversold() -> f64 {
    20.0
}

fn default_stoch_overbought() -> f64 {
    80.0
}

fn default_breakout_lookback() -> usize {
    20
}

fn default_breakout_threshold() -> f64 {
    0.001
}

fn default_vwap_period() -> usize {
    20
}

fn default_vwap_deviation_threshold() -> f64 {
    1.5
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_deviation() -> f64 {
    2.0
}

/// Per-strategy tunables. Flat on purpose: the console edits these as a single
/// settings blob and only the named strategy reads its own fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSettings {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    #[serde(default = "default_ma_fast_period")]
    pub ma_fast_period: usize,
    #[serde(default = "default_ma_slow_period")]
    pub ma_slow_period: usize,

    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    #[serde(default = "default_stoch_k_period")]
    pub stoch_k_period: usize,
    #[serde(default = "default_stoch_d_period")]
    pub stoch_d_period: usize,
    #[serde(default = "default_stoch_oversold")]
    pub stoch_oversold: f64,
    #[serde(default = "default_stoch_overbought")]
    pub stoch_overbought: f64,

    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,
    /// Relative breakout threshold (e.g. 0.001 = 0.1 % beyond the level).
    #[serde(default = "default_breakout_threshold")]
    pub breakout_threshold: f64,

    #[serde(default = "default_vwap_period")]
    pub vwap_period: usize,
    /// Band width in standard deviations for the mean-reversion trigger.
    #[serde(default = "default_vwap_deviation_threshold")]
    pub vwap_deviation_threshold: f64,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_deviation")]
    pub bb_deviation: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            ma_fast_period: default_ma_fast_period(),
            ma_slow_period: default_ma_slow_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            stoch_k_period: default_stoch_k_period(),
            stoch_d_period: default_stoch_d_period(),
            stoch_oversold: default_stoch_oversold(),
            stoch_overbought: default_stoch_overbought(),
            breakout_lookback: default_breakout_lookback(),
            breakout_threshold: default_breakout_threshold(),
            vwap_period: default_vwap_period(),
            vwap_deviation_threshold: default_vwap_deviation_threshold(),
            bb_period: default_bb_period(),
            bb_deviation: default_bb_deviation(),
        }
    }
}

// =============================================================================
// BotConfig
// =============================================================================

/// Per-bot configuration as submitted by the console.
///
/// The running loop snapshots this once per cycle; mutating a stored config
/// never races a cycle in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Candle-based or tick-based loop. This controller schedules the HFT loop.
    #[serde(default)]
    pub mode: TradeMode,

    /// Name of the strategy in the registry (e.g. "rsi", "moving_average").
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,

    /// Instrument identifier passed to the market access port.
    #[serde(default)]
    pub symbol: String,

    /// Period of the analysis loop, in seconds (>= 1).
    #[serde(default = "default_analysis_interval_secs")]
    pub analysis_interval_secs: u64,

    /// Span of the rolling tick window, in seconds (>= 1).
    #[serde(default = "default_tick_lookback_secs")]
    pub tick_lookback_secs: u64,

    /// Signals below this confidence are dropped.
    #[serde(default = "default_min_signal_confidence")]
    pub min_signal_confidence: f64,

    /// Volume per order, in broker lots.
    #[serde(default = "default_lot_size_per_trade")]
    pub lot_size_per_trade: f64,

    /// Stop-loss distance in pips. Canonical name; legacy payloads used
    /// `sl_pips` or `stopLoss`.
    #[serde(default = "default_stop_loss_pips", alias = "sl_pips", alias = "stopLoss")]
    pub stop_loss_pips: f64,

    /// Take-profit distance in pips. Canonical name; legacy payloads used
    /// `tp_pips` or `takeProfit`.
    #[serde(
        default = "default_take_profit_pips",
        alias = "tp_pips",
        alias = "takeProfit"
    )]
    pub take_profit_pips: f64,

    /// If true, SL/TP come straight from the pip fields; otherwise TP is
    /// derived as `risk_reward_ratio × stop_loss_pips`.
    #[serde(default = "default_true")]
    pub use_manual_sl_tp: bool,

    /// Reward-to-risk multiplier used when `use_manual_sl_tp` is false.
    #[serde(default = "default_risk_reward_ratio")]
    pub risk_reward_ratio: f64,

    /// Trade-count cap per UTC day.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,

    /// Rolling sixty-second order cap.
    #[serde(default = "default_max_orders_per_minute")]
    pub max_orders_per_minute: u32,

    /// Minimum gap after any successful order, in seconds.
    #[serde(default = "default_cooldown_secs_after_trade")]
    pub cooldown_secs_after_trade: u64,

    /// Daily realized+unrealized loss cap, in account currency.
    #[serde(default = "default_max_loss_threshold")]
    pub max_loss_threshold: f64,

    /// Daily P&L pause threshold, in account currency.
    #[serde(default = "default_max_profit_threshold")]
    pub max_profit_threshold: f64,

    /// Consecutive losing trades before protection trips.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// Consecutive winning trades before protection pauses.
    #[serde(default = "default_max_consecutive_profits")]
    pub max_consecutive_profits: u32,

    /// Reject the cycle when the spread exceeds the symbol's limit.
    #[serde(default = "default_true")]
    pub enable_spread_filter: bool,

    /// Spread limit in points. `None` falls back to the per-symbol default
    /// table.
    #[serde(default)]
    pub symbol_spread_limit: Option<i64>,

    /// Per-strategy parameters.
    #[serde(default)]
    pub indicator_settings: IndicatorSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mode: TradeMode::default(),
            strategy_name: default_strategy_name(),
            symbol: String::new(),
            analysis_interval_secs: default_analysis_interval_secs(),
            tick_lookback_secs: default_tick_lookback_secs(),
            min_signal_confidence: default_min_signal_confidence(),
            lot_size_per_trade: default_lot_size_per_trade(),
            stop_loss_pips: default_stop_loss_pips(),
            take_profit_pips: default_take_profit_pips(),
            use_manual_sl_tp: true,
            risk_reward_ratio: default_risk_reward_ratio(),
            max_daily_trades: default_max_daily_trades(),
            max_orders_per_minute: default_max_orders_per_minute(),
            cooldown_secs_after_trade: default_cooldown_secs_after_trade(),
            max_loss_threshold: default_max_loss_threshold(),
            max_profit_threshold: default_max_profit_threshold(),
            max_consecutive_losses: default_max_consecutive_losses(),
            max_consecutive_profits: default_max_consecutive_profits(),
            enable_spread_filter: true,
            symbol_spread_limit: None,
            indicator_settings: IndicatorSettings::default(),
        }
    }
}

impl BotConfig {
    /// Validate the config for `start`. Range checks only; symbol existence is
    /// the market access port's call.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.symbol.trim().is_empty() {
            return Err(ControllerError::ConfigInvalid("symbol is required".into()));
        }
        if !crate::strategies::is_known(&self.strategy_name) {
            return Err(ControllerError::ConfigInvalid(format!(
                "unknown strategy '{}'",
                self.strategy_name
            )));
        }
        if self.analysis_interval_secs < 1 {
            return Err(ControllerError::ConfigInvalid(
                "analysis_interval_secs must be >= 1".into(),
            ));
        }
        if self.tick_lookback_secs < 1 {
            return Err(ControllerError::ConfigInvalid(
                "tick_lookback_secs must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_signal_confidence) {
            return Err(ControllerError::ConfigInvalid(
                "min_signal_confidence must be in [0, 1]".into(),
            ));
        }
        if self.lot_size_per_trade <= 0.0 {
            return Err(ControllerError::ConfigInvalid(
                "lot_size_per_trade must be > 0".into(),
            ));
        }
        if self.stop_loss_pips <= 0.0 {
            return Err(ControllerError::ConfigInvalid(
                "stop_loss_pips must be > 0".into(),
            ));
        }
        if self.use_manual_sl_tp {
            if self.take_profit_pips <= 0.0 {
                return Err(ControllerError::ConfigInvalid(
                    "take_profit_pips must be > 0 when use_manual_sl_tp is set".into(),
                ));
            }
        } else if self.risk_reward_ratio <= 0.0 {
            return Err(ControllerError::ConfigInvalid(
                "risk_reward_ratio must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the effective SL/TP pip distances.
    ///
    /// Manual mode uses both pip fields directly; automatic mode derives
    /// `tp = risk_reward_ratio × sl`.
    pub fn resolved_sl_tp_pips(&self) -> (f64, f64) {
        if self.use_manual_sl_tp {
            (self.stop_loss_pips, self.take_profit_pips)
        } else {
            (self.stop_loss_pips, self.risk_reward_ratio * self.stop_loss_pips)
        }
    }

    /// Effective spread limit in points for this bot's symbol.
    pub fn spread_limit_points(&self) -> i64 {
        self.symbol_spread_limit
            .unwrap_or_else(|| default_spread_limit_points(&self.symbol))
    }
}

/// Built-in spread limits (points) for common instruments. Anything unknown
/// gets a permissive 100-point limit; configs override per bot.
pub fn default_spread_limit_points(symbol: &str) -> i64 {
    match symbol.to_ascii_uppercase().as_str() {
        "ETHUSD" => 1000,
        "BTCUSD" => 1000,
        "EURUSD" => 5,
        "GBPUSD" => 10,
        "USDJPY" => 10,
        "XAUUSD" => 50,
        _ => 100,
    }
}

// =============================================================================
// ControllerConfig
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["ETHUSD".to_string(), "BTCUSD".to_string(), "EURUSD".to_string()]
}

/// Top-level service configuration: the symbols the demo service trades and
/// the bot template it starts them with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Template applied to every bot the demo service starts. The `symbol`
    /// field is overwritten per bot.
    #[serde(default)]
    pub default_bot: BotConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            default_bot: BotConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read controller config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse controller config from {}", path.display()))?;

        info!(path = %path.display(), symbols = ?config.symbols, "controller config loaded");
        Ok(config)
    }

    /// Persist the configuration atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise controller config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "controller config saved (atomic)");
        Ok(())
    }
}
