// =============================================================================
// Order Executor — builds, places, and confirms orders against the terminal
// =============================================================================
//
// Construction rules:
//   * entry = ask for BUY, bid for SELL
//   * sl_price = entry − dir × sl_pips × pip_size
//   * tp_price = entry + dir × tp_pips × pip_size     (dir: +1 BUY, −1 SELL)
//   * comment  = TradePulse_bot_<id>_<MODE>_<DIRECTION>
//
// Submission policy: SL/TP are forced whenever both prices are positive —
// rejections are retried with the next filling mode (IOC, FOK, RETURN), never
// by dropping the stops. A minimum-stop-distance rejection gets exactly one
// outward one-pip clamp retry before surfacing.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::errors::ControllerError;
use crate::market_access::{
    pip, FillingMode, MarketAccess, OrderRequest, OrderResult, OrderRetcode, PositionInfo, Quote,
    SymbolInfo,
};
use crate::strategies::Signal;
use crate::types::{BotId, Side, TradeMode};

// ---------------------------------------------------------------------------
// Order tag grammar
// ---------------------------------------------------------------------------

const TAG_PREFIX: &str = "TradePulse_bot";
const MANUAL_CLOSE_PREFIX: &str = "Manual_Close_";

/// Build the attribution tag: `TradePulse_bot_<id>_<MODE>_<DIRECTION>`.
pub fn build_order_comment(bot_id: BotId, mode: TradeMode, side: Side) -> String {
    format!("{TAG_PREFIX}_{bot_id}_{mode}_{side}")
}

/// Recover `(bot_id, mode, direction)` from an order tag. `None` for foreign
/// or malformed comments.
pub fn parse_order_comment(comment: &str) -> Option<(BotId, TradeMode, Side)> {
    let mut parts = comment.split('_');
    if parts.next()? != "TradePulse" || parts.next()? != "bot" {
        return None;
    }
    let bot_id: BotId = parts.next()?.parse().ok()?;
    let mode = match parts.next()? {
        "HFT" => TradeMode::Hft,
        "CANDLE" => TradeMode::Candle,
        _ => return None,
    };
    let side = match parts.next()? {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((bot_id, mode, side))
}

/// True when the tag marks a tick-loop (HFT) trade.
pub fn is_hft_comment(comment: &str) -> bool {
    comment.contains("_HFT_")
}

/// Tag attached to manual close deals: `Manual_Close_<ticket>`.
pub fn build_close_comment(ticket: u64) -> String {
    format!("{MANUAL_CLOSE_PREFIX}{ticket}")
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A successfully placed order, as reported back to the bot loop.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedOrder {
    pub ticket: u64,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub sl_price: f64,
    pub tp_price: f64,
    pub comment: String,
    pub filling_mode: FillingMode,
}

/// A completed manual close.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedPosition {
    pub ticket: u64,
    pub close_price: f64,
    /// Broker-reported profit when present, recomputed from fills otherwise.
    pub profit: f64,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    port: Arc<dyn MarketAccess>,
}

impl OrderExecutor {
    pub fn new(port: Arc<dyn MarketAccess>) -> Self {
        Self { port }
    }

    /// Transform a qualifying signal into a submitted order.
    pub async fn execute_signal(
        &self,
        bot_id: BotId,
        mode: TradeMode,
        signal: &Signal,
        config: &BotConfig,
        quote: &Quote,
        info: &SymbolInfo,
    ) -> Result<ExecutedOrder, ControllerError> {
        let side = signal.kind;
        let entry_price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        let (sl_pips, tp_pips) = config.resolved_sl_tp_pips();
        let pip_size = pip::pip_size(info);
        let dir = side.direction();

        let sl_price = entry_price - dir * sl_pips * pip_size;
        let tp_price = entry_price + dir * tp_pips * pip_size;
        let comment = build_order_comment(bot_id, mode, side);

        info!(
            bot_id,
            symbol = %config.symbol,
            side = %side,
            entry_price,
            sl_price,
            tp_price,
            volume = config.lot_size_per_trade,
            confidence = signal.confidence,
            "submitting order"
        );

        let mut request = OrderRequest {
            symbol: config.symbol.clone(),
            side,
            volume: config.lot_size_per_trade,
            price: entry_price,
            // SL/TP are forced whenever the computed prices are positive.
            sl: (sl_price > 0.0).then_some(sl_price),
            tp: (tp_price > 0.0).then_some(tp_price),
            filling_mode: FillingMode::LADDER[0],
            comment,
            closes_ticket: None,
        };

        let (result, filling_mode) = self
            .send_with_retries(&mut request, dir, pip_size, &config.symbol)
            .await?;

        let ticket = result.ticket.ok_or_else(|| {
            ControllerError::Internal("terminal reported success without a ticket".into())
        })?;

        Ok(ExecutedOrder {
            ticket,
            side,
            volume: request.volume,
            entry_price: result.executed_price.unwrap_or(entry_price),
            sl_price: request.sl.unwrap_or(0.0),
            tp_price: request.tp.unwrap_or(0.0),
            comment: request.comment.clone(),
            filling_mode,
        })
    }

    /// Close an open position with an opposite-side deal at the crossing
    /// quote.
    pub async fn close_position(
        &self,
        position: &PositionInfo,
        quote: &Quote,
    ) -> Result<ClosedPosition, ControllerError> {
        let side = position.side.opposite();
        let price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        info!(
            ticket = position.ticket,
            symbol = %position.symbol,
            close_side = %side,
            price,
            "submitting manual close"
        );

        let mut request = OrderRequest {
            symbol: position.symbol.clone(),
            side,
            volume: position.volume,
            price,
            sl: None,
            tp: None,
            filling_mode: FillingMode::LADDER[0],
            comment: build_close_comment(position.ticket),
            closes_ticket: Some(position.ticket),
        };

        let (result, _) = self
            .send_with_retries(&mut request, side.direction(), 0.0, &position.symbol)
            .await?;

        let close_price = result.executed_price.unwrap_or(price);
        let profit = result.profit.unwrap_or_else(|| {
            (close_price - position.entry_price) * position.side.direction() * position.volume
        });

        Ok(ClosedPosition {
            ticket: position.ticket,
            close_price,
            profit,
        })
    }

    /// Submission loop: walk the filling-mode ladder on mode rejections, grant
    /// a single outward stop clamp on a minimum-distance rejection, surface
    /// everything else immediately.
    async fn send_with_retries(
        &self,
        request: &mut OrderRequest,
        dir: f64,
        pip_size: f64,
        symbol: &str,
    ) -> Result<(OrderResult, FillingMode), ControllerError> {
        let mut stops_clamped = false;
        let mut ladder = FillingMode::LADDER.iter().copied();
        let mut filling_mode = match ladder.next() {
            Some(mode) => mode,
            None => return Err(ControllerError::Internal("empty filling ladder".into())),
        };

        loop {
            request.filling_mode = filling_mode;
            let result = self.port.order_send(request).await?;

            match result.retcode {
                OrderRetcode::Done => {
                    debug!(
                        symbol,
                        filling_mode = %filling_mode,
                        ticket = ?result.ticket,
                        "order accepted"
                    );
                    return Ok((result, filling_mode));
                }
                OrderRetcode::InvalidFill => {
                    warn!(symbol, filling_mode = %filling_mode, "filling mode refused");
                    filling_mode = match ladder.next() {
                        Some(next) => next,
                        None => {
                            return Err(ControllerError::FillingModeUnsupported {
                                symbol: symbol.to_string(),
                            })
                        }
                    };
                }
                OrderRetcode::InvalidStops => {
                    if stops_clamped || pip_size <= 0.0 {
                        return Err(ControllerError::StopDistanceRejected {
                            symbol: symbol.to_string(),
                        });
                    }
                    stops_clamped = true;
                    // Clamp outward: SL further below/above entry, TP further
                    // beyond it, by exactly one pip.
                    request.sl = request.sl.map(|sl| sl - dir * pip_size);
                    request.tp = request.tp.map(|tp| tp + dir * pip_size);
                    warn!(
                        symbol,
                        sl = ?request.sl,
                        tp = ?request.tp,
                        "stop distance refused; clamped outward one pip"
                    );
                }
                OrderRetcode::Rejected(code) => {
                    return Err(ControllerError::OrderRejected {
                        retcode: code,
                        message: result
                            .message
                            .unwrap_or_else(|| "order rejected by terminal".to_string()),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for OrderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderExecutor").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_access::testing::ScriptedTerminal;
    use crate::strategies::Signal;
    use chrono::Utc;

    fn info() -> SymbolInfo {
        SymbolInfo {
            point_size: 0.01,
            digits: 2,
            stop_level_points: 10,
            volume_step: 0.01,
        }
    }

    fn quote() -> Quote {
        Quote {
            bid: 4300.00,
            ask: 4300.50,
            ts: Utc::now(),
        }
    }

    fn config() -> BotConfig {
        let mut cfg = BotConfig::default();
        cfg.symbol = "ETHUSD".into();
        cfg.lot_size_per_trade = 0.5;
        cfg.stop_loss_pips = 20.0;
        cfg.take_profit_pips = 40.0;
        cfg.use_manual_sl_tp = true;
        cfg
    }

    fn buy_signal() -> Signal {
        Signal::new(Side::Buy, 4300.50, 0.8, "test")
    }

    fn rejected(retcode: OrderRetcode) -> OrderResult {
        OrderResult {
            retcode,
            ticket: None,
            executed_price: None,
            profit: None,
            message: Some("scripted rejection".into()),
        }
    }

    // ---- tag grammar -------------------------------------------------------

    #[test]
    fn tag_round_trip() {
        for &(id, mode, side) in &[
            (1, TradeMode::Hft, Side::Buy),
            (7, TradeMode::Hft, Side::Sell),
            (42, TradeMode::Candle, Side::Buy),
        ] {
            let tag = build_order_comment(id, mode, side);
            assert_eq!(parse_order_comment(&tag), Some((id, mode, side)));
        }
    }

    #[test]
    fn tag_matches_grammar_exactly() {
        assert_eq!(
            build_order_comment(7, TradeMode::Hft, Side::Buy),
            "TradePulse_bot_7_HFT_BUY"
        );
        assert!(is_hft_comment("TradePulse_bot_7_HFT_BUY"));
        assert!(!is_hft_comment("TradePulse_bot_7_CANDLE_BUY"));
    }

    #[test]
    fn foreign_comments_do_not_parse() {
        assert!(parse_order_comment("Manual_Close_12").is_none());
        assert!(parse_order_comment("TradePulse_bot_x_HFT_BUY").is_none());
        assert!(parse_order_comment("TradePulse_bot_7_SCALP_BUY").is_none());
        assert!(parse_order_comment("TradePulse_bot_7_HFT_BUY_extra").is_none());
        assert!(parse_order_comment("").is_none());
    }

    // ---- construction ------------------------------------------------------

    #[tokio::test]
    async fn buy_order_pip_math() {
        let port = Arc::new(ScriptedTerminal::new());
        let executor = OrderExecutor::new(port.clone());

        let executed = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap();

        assert_eq!(executed.entry_price, 4300.50);
        assert!((executed.sl_price - 4300.30).abs() < 1e-9);
        assert!((executed.tp_price - 4300.90).abs() < 1e-9);
        assert_eq!(executed.comment, "TradePulse_bot_1_HFT_BUY");
        assert_eq!(executed.volume, 0.5);

        let sent = port.sent_orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].filling_mode, FillingMode::Ioc);
        assert!(sent[0].sl.is_some() && sent[0].tp.is_some());
    }

    #[tokio::test]
    async fn sell_order_pip_math() {
        let port = Arc::new(ScriptedTerminal::new());
        let executor = OrderExecutor::new(port.clone());
        let signal = Signal::new(Side::Sell, 4300.00, 0.8, "test");

        let executed = executor
            .execute_signal(1, TradeMode::Hft, &signal, &config(), &quote(), &info())
            .await
            .unwrap();

        assert_eq!(executed.entry_price, 4300.00);
        assert!((executed.sl_price - 4300.20).abs() < 1e-9);
        assert!((executed.tp_price - 4299.60).abs() < 1e-9);
        assert_eq!(executed.comment, "TradePulse_bot_1_HFT_SELL");
    }

    #[tokio::test]
    async fn risk_reward_ratio_derives_tp() {
        let port = Arc::new(ScriptedTerminal::new());
        let executor = OrderExecutor::new(port.clone());

        let mut cfg = config();
        cfg.use_manual_sl_tp = false;
        cfg.stop_loss_pips = 10.0;
        cfg.risk_reward_ratio = 3.0;

        let executed = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &cfg, &quote(), &info())
            .await
            .unwrap();

        // sl 10 pips below, tp 30 pips above.
        assert!((executed.sl_price - 4300.40).abs() < 1e-9);
        assert!((executed.tp_price - 4300.80).abs() < 1e-9);
    }

    // ---- submission policy -------------------------------------------------

    #[tokio::test]
    async fn filling_mode_ladder_retries() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(rejected(OrderRetcode::InvalidFill));
        // Second attempt falls through to the default Done.

        let executor = OrderExecutor::new(port.clone());
        let executed = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap();

        assert_eq!(executed.filling_mode, FillingMode::Fok);
        let sent = port.sent_orders();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].filling_mode, FillingMode::Ioc);
        assert_eq!(sent[1].filling_mode, FillingMode::Fok);
        // The stops never got dropped along the way.
        assert!(sent.iter().all(|r| r.sl.is_some() && r.tp.is_some()));
    }

    #[tokio::test]
    async fn all_filling_modes_refused() {
        let port = Arc::new(ScriptedTerminal::new());
        for _ in 0..3 {
            port.push_order_result(rejected(OrderRetcode::InvalidFill));
        }

        let executor = OrderExecutor::new(port.clone());
        let err = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::FillingModeUnsupported { .. }));
        assert_eq!(port.sent_orders().len(), 3);
    }

    #[tokio::test]
    async fn stop_distance_clamps_once_then_succeeds() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(rejected(OrderRetcode::InvalidStops));

        let executor = OrderExecutor::new(port.clone());
        let executed = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap();

        // One pip further out on both sides.
        assert!((executed.sl_price - 4300.29).abs() < 1e-9);
        assert!((executed.tp_price - 4300.91).abs() < 1e-9);
        assert_eq!(port.sent_orders().len(), 2);
    }

    #[tokio::test]
    async fn stop_distance_rejected_twice_surfaces() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(rejected(OrderRetcode::InvalidStops));
        port.push_order_result(rejected(OrderRetcode::InvalidStops));

        let executor = OrderExecutor::new(port.clone());
        let err = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::StopDistanceRejected { .. }));
        assert_eq!(port.sent_orders().len(), 2);
    }

    #[tokio::test]
    async fn other_rejections_do_not_retry() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(rejected(OrderRetcode::Rejected(10019)));

        let executor = OrderExecutor::new(port.clone());
        let err = executor
            .execute_signal(1, TradeMode::Hft, &buy_signal(), &config(), &quote(), &info())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ControllerError::OrderRejected { retcode: 10019, .. }
        ));
        assert_eq!(port.sent_orders().len(), 1);
    }

    // ---- manual close ------------------------------------------------------

    fn open_position() -> PositionInfo {
        PositionInfo {
            ticket: 77,
            symbol: "ETHUSD".into(),
            side: Side::Buy,
            volume: 2.0,
            entry_price: 4299.00,
            current_price: 4300.00,
            unrealized_pnl: 2.0,
            comment: "TradePulse_bot_1_HFT_BUY".into(),
            opened_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn manual_close_uses_broker_profit_when_present() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(OrderResult {
            retcode: OrderRetcode::Done,
            ticket: Some(77),
            executed_price: Some(4300.00),
            profit: Some(1.87),
            message: None,
        });

        let executor = OrderExecutor::new(port.clone());
        let closed = executor.close_position(&open_position(), &quote()).await.unwrap();

        assert_eq!(closed.ticket, 77);
        assert!((closed.profit - 1.87).abs() < 1e-9);

        let sent = port.sent_orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].side, Side::Sell); // opposite of the long
        assert_eq!(sent[0].price, 4300.00); // crossing bid
        assert_eq!(sent[0].comment, "Manual_Close_77");
        assert_eq!(sent[0].closes_ticket, Some(77));
    }

    #[tokio::test]
    async fn manual_close_recomputes_profit_when_absent() {
        let port = Arc::new(ScriptedTerminal::new());
        port.push_order_result(OrderResult {
            retcode: OrderRetcode::Done,
            ticket: Some(77),
            executed_price: Some(4300.00),
            profit: None,
            message: None,
        });

        let executor = OrderExecutor::new(port);
        let closed = executor.close_position(&open_position(), &quote()).await.unwrap();

        // (4300.00 - 4299.00) * +1 * 2.0 lots
        assert!((closed.profit - 2.0).abs() < 1e-9);
    }
}
