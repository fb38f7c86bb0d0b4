// =============================================================================
// Bot — the per-instrument tick-driven analysis loop
// =============================================================================
//
// Each bot owns one long-lived task. Every cycle it: drains routed trade
// completions, fetches the current quote, refreshes unrealized P&L from its
// tagged positions, walks the gate chain (status, spread), acquires a tick
// window through the fallback ladder, evaluates its strategy, walks the
// remaining gates (caps, streaks, rate, cooldown, confidence), submits the
// order, and publishes one `bot_update`.
//
// Iterations are strictly serial. Cancellation is a watch flag observed
// between cycles at the select point: an in-flight cycle (and any order
// submission inside it) always completes before the loop exits and runs its
// finalizer. Errors never escape a cycle; they become telemetry.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::errors::ControllerError;
use crate::events::{BotUpdate, Event, EventRouter};
use crate::executor::{parse_order_comment, OrderExecutor};
use crate::market_access::{pip, MarketAccess, Quote, SymbolInfo};
use crate::protection::{GateDecision, ProtectionState};
use crate::strategies::{self, Signal, StrategyCtx};
use crate::tick_pipeline;
use crate::types::{BotId, BotStatus};

/// Bound on the quote/position calls made directly by the loop.
const MARKET_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// A completed trade routed back to its owning bot by the supervisor.
#[derive(Debug, Clone)]
pub struct TradeCompletion {
    pub ticket: u64,
    pub profit: f64,
}

/// Mutable bot state. The owning loop is the only writer apart from the
/// supervisor's operator resume (a single status flip); readers take
/// snapshots.
pub struct BotState {
    pub status: BotStatus,
    pub last_quote: Option<Quote>,
    pub last_signal: Option<Signal>,
    pub protection: ProtectionState,
    pub cycles: u64,
}

impl BotState {
    pub fn new() -> Self {
        Self {
            status: BotStatus::Running,
            last_quote: None,
            last_signal: None,
            protection: ProtectionState::new(Utc::now()),
            cycles: 0,
        }
    }
}

impl Default for BotState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the spawned loop task owns.
pub(crate) struct BotRuntime {
    pub id: BotId,
    pub config: BotConfig,
    pub info: SymbolInfo,
    pub state: Arc<RwLock<BotState>>,
    pub port: Arc<dyn MarketAccess>,
    pub router: EventRouter,
    pub completions: mpsc::UnboundedReceiver<TradeCompletion>,
    pub stop_rx: watch::Receiver<bool>,
}

impl BotRuntime {
    /// Drive the analysis loop until the stop flag flips.
    pub(crate) async fn run(mut self) {
        self.router.publish(Event::BotStarted {
            bot_id: self.id,
            symbol: self.config.symbol.clone(),
            strategy: self.config.strategy_name.clone(),
        });
        info!(
            bot_id = self.id,
            symbol = %self.config.symbol,
            strategy = %self.config.strategy_name,
            interval_secs = self.config.analysis_interval_secs,
            "bot loop starting"
        );

        let executor = OrderExecutor::new(self.port.clone());
        let period = std::time::Duration::from_secs(self.config.analysis_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut stop_rx = self.stop_rx.clone();
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = interval.tick() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    self.run_cycle(&executor).await;
                }
            }
        }

        // Finalizer: terminal state, final event, open positions untouched.
        self.state.write().status = BotStatus::Stopped;
        self.router.publish(Event::BotStopped { bot_id: self.id });
        info!(bot_id = self.id, "bot stopped");
    }

    /// One analysis iteration. Never panics the loop; every failure becomes a
    /// cycle outcome.
    pub(crate) async fn run_cycle(&mut self, executor: &OrderExecutor) {
        let now = Utc::now();
        let invocation = {
            let mut state = self.state.write();
            let invocation = state.cycles;
            state.cycles += 1;
            state.protection.maybe_reset_daily(now);
            invocation
        };

        self.apply_completions(now);

        // Current quote; a miss skips the cycle.
        let quote = match timeout(
            MARKET_CALL_TIMEOUT,
            self.port.current_quote(&self.config.symbol),
        )
        .await
        {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => {
                warn!(bot_id = self.id, error = %e, "quote unavailable; skipping cycle");
                self.publish_update(outcome_for(&e));
                return;
            }
            Err(_) => {
                let e = ControllerError::MarketDataUnavailable("quote timed out".into());
                warn!(bot_id = self.id, "quote timed out; skipping cycle");
                self.publish_update(outcome_for(&e));
                return;
            }
        };
        self.state.write().last_quote = Some(quote);

        self.refresh_unrealized().await;

        // Gate 1: status. A paused bot keeps publishing but never submits.
        let status = self.state.read().status;
        if status != BotStatus::Running {
            self.publish_update(format!("suppressed: status {status}"));
            return;
        }

        // Gate 2: spread.
        if let Err(e) = ProtectionState::check_spread(&self.config, &quote, self.info.point_size) {
            info!(bot_id = self.id, error = %e, "cycle rejected by spread gate");
            self.publish_update(outcome_for(&e));
            return;
        }

        // Rolling tick window via the fallback ladder.
        let window = match tick_pipeline::acquire_window(
            self.port.as_ref(),
            &self.config.symbol,
            self.config.tick_lookback_secs,
            &quote,
        )
        .await
        {
            Ok((window, rung)) => {
                debug!(bot_id = self.id, ticks = window.len(), rung = %rung, "window acquired");
                window
            }
            Err(e) => {
                warn!(bot_id = self.id, error = %e, "tick ladder exhausted; skipping cycle");
                self.publish_update(outcome_for(&e));
                return;
            }
        };

        // Strategy evaluation over the config snapshot.
        let ctx = StrategyCtx {
            symbol: &self.config.symbol,
            settings: &self.config.indicator_settings,
            window: &window,
            quote: &quote,
            pip_size: pip::pip_size(&self.info),
            point_size: self.info.point_size,
            invocation,
        };
        let Some(signal) = strategies::evaluate(&self.config.strategy_name, &ctx) else {
            self.publish_update(outcome_for(&ControllerError::NoSignal));
            return;
        };
        self.state.write().last_signal = Some(signal.clone());

        // Gates 3..7: caps, streaks, trade count, rate, cooldown.
        let decision = self.state.write().protection.evaluate_gates(now, &self.config);
        match decision {
            GateDecision::Clear => {}
            GateDecision::Suppress { reason } => {
                debug!(bot_id = self.id, %reason, "submission suppressed");
                self.publish_update(format!("suppressed: {reason}"));
                return;
            }
            GateDecision::Pause { reason } => {
                self.state.write().status = BotStatus::PausedProtection;
                let e = ControllerError::ProtectionPaused(reason);
                self.router.publish(Event::TradeError {
                    bot_id: self.id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                self.publish_update(outcome_for(&e));
                return;
            }
        }

        // Gate 8: confidence.
        if signal.confidence < self.config.min_signal_confidence {
            let e = ControllerError::LowConfidence {
                confidence: signal.confidence,
                threshold: self.config.min_signal_confidence,
            };
            self.publish_update(outcome_for(&e));
            return;
        }

        // Submission. The executor completes even if a stop arrives meanwhile.
        match executor
            .execute_signal(self.id, self.config.mode, &signal, &self.config, &quote, &self.info)
            .await
        {
            Ok(executed) => {
                self.state.write().protection.record_order(Utc::now());
                self.router.publish(Event::TradeExecuted {
                    bot_id: self.id,
                    ticket: executed.ticket,
                    direction: executed.side,
                    volume: executed.volume,
                    entry_price: executed.entry_price,
                    sl_price: executed.sl_price,
                    tp_price: executed.tp_price,
                });
                self.publish_update("trade_executed".to_string());
            }
            Err(e) => {
                warn!(bot_id = self.id, error = %e, "order submission failed");
                self.router.publish(Event::TradeError {
                    bot_id: self.id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                self.publish_update(outcome_for(&e));
            }
        }
    }

    /// Apply queued trade completions in arrival order.
    fn apply_completions(&mut self, now: chrono::DateTime<Utc>) {
        while let Ok(completion) = self.completions.try_recv() {
            self.state
                .write()
                .protection
                .record_completion(now, completion.profit);
            self.router.publish(Event::TradeCompleted {
                bot_id: self.id,
                ticket: completion.ticket,
                profit: completion.profit,
            });
        }
    }

    /// Refresh unrealized P&L from open positions carrying this bot's tag.
    /// Failures keep the previous value; unrealized P&L is advisory.
    async fn refresh_unrealized(&self) {
        let positions = timeout(
            MARKET_CALL_TIMEOUT,
            self.port.positions(Some(&self.config.symbol), None),
        )
        .await;

        if let Ok(Ok(positions)) = positions {
            let unrealized: f64 = positions
                .iter()
                .filter(|p| {
                    parse_order_comment(&p.comment)
                        .is_some_and(|(bot_id, _, _)| bot_id == self.id)
                })
                .map(|p| p.unrealized_pnl)
                .sum();
            self.state.write().protection.set_unrealized(unrealized);
        }
    }

    /// One `bot_update` per cycle, whatever the outcome.
    fn publish_update(&self, cycle_outcome: String) {
        let now = Utc::now();
        let update = {
            let mut state = self.state.write();
            BotUpdate {
                bot_id: self.id,
                status: state.status,
                last_quote: state.last_quote,
                last_signal: state.last_signal.clone(),
                performance: state.protection.snapshot(now),
                next_analysis_in_secs: self.config.analysis_interval_secs,
                cycle_outcome,
            }
        };
        self.router.publish(Event::BotUpdate(update));
    }
}

/// Telemetry label for a cycle that ended in an error.
fn outcome_for(error: &ControllerError) -> String {
    format!("{}: {}", error.kind(), error)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventEnvelope;
    use crate::market_access::testing::ScriptedTerminal;
    use crate::market_access::SymbolInfo;
    use tokio::sync::broadcast;

    fn eth_info() -> SymbolInfo {
        SymbolInfo {
            point_size: 0.01,
            digits: 2,
            stop_level_points: 10,
            volume_step: 0.01,
        }
    }

    fn base_config() -> BotConfig {
        let mut cfg = BotConfig::default();
        cfg.symbol = "ETHUSD".into();
        cfg.analysis_interval_secs = 1;
        cfg.tick_lookback_secs = 60;
        cfg
    }

    struct Harness {
        runtime: BotRuntime,
        port: Arc<ScriptedTerminal>,
        events: broadcast::Receiver<EventEnvelope>,
        completions_tx: mpsc::UnboundedSender<TradeCompletion>,
        _stop_tx: watch::Sender<bool>,
    }

    fn harness(config: BotConfig) -> Harness {
        let port = Arc::new(ScriptedTerminal::new());
        port.set_symbol("ETHUSD", eth_info());
        port.set_quote(Quote {
            bid: 4300.00,
            ask: 4300.50,
            ts: Utc::now(),
        });

        let router = EventRouter::new();
        let events = router.subscribe();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let runtime = BotRuntime {
            id: 1,
            config,
            info: eth_info(),
            state: Arc::new(RwLock::new(BotState::new())),
            port: port.clone(),
            router,
            completions,
            stop_rx,
        };

        Harness {
            runtime,
            port,
            events,
            completions_tx,
            _stop_tx: stop_tx,
        }
    }

    fn drain(events: &mut broadcast::Receiver<EventEnvelope>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            out.push(envelope.event);
        }
        out
    }

    // S1: a single synthesized tick still yields a full order with pip-exact
    // SL/TP and the attribution tag.
    #[tokio::test]
    async fn one_tick_rsi_fallback_places_an_order() {
        let mut cfg = base_config();
        cfg.strategy_name = "rsi".into();
        cfg.min_signal_confidence = 0.5;
        cfg.use_manual_sl_tp = true;
        cfg.stop_loss_pips = 20.0;
        cfg.take_profit_pips = 40.0;
        cfg.lot_size_per_trade = 1.0;

        let mut h = harness(cfg);
        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        // Quote mid 4300.25 -> odd point parity -> SELL at the bid.
        let sent = h.port.sent_orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].side, crate::types::Side::Sell);
        assert_eq!(sent[0].price, 4300.00);
        assert!((sent[0].sl.unwrap() - 4300.20).abs() < 1e-9);
        assert!((sent[0].tp.unwrap() - 4299.60).abs() < 1e-9);
        assert_eq!(sent[0].comment, "TradePulse_bot_1_HFT_SELL");

        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::TradeExecuted { ticket, .. } if *ticket >= 1000)));
    }

    // S2: wide spread rejects the cycle before any strategy work.
    #[tokio::test]
    async fn spread_gate_rejects_the_cycle() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into();
        cfg.enable_spread_filter = true;
        cfg.symbol_spread_limit = Some(100);
        cfg.min_signal_confidence = 0.0;

        let mut h = harness(cfg);
        h.port.set_quote(Quote {
            bid: 4300.00,
            ask: 4302.00, // 200 points
            ts: Utc::now(),
        });

        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        assert!(h.port.sent_orders().is_empty());
        let events = drain(&mut h.events);
        let update = events
            .iter()
            .find_map(|e| match e {
                Event::BotUpdate(u) => Some(u.clone()),
                _ => None,
            })
            .expect("cycle publishes an update");
        assert!(update.cycle_outcome.contains("SpreadTooWide"));
    }

    // S3: the rolling-minute rate cap allows exactly two submissions.
    #[tokio::test]
    async fn rate_gate_caps_submissions() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into();
        cfg.min_signal_confidence = 0.0;
        cfg.max_orders_per_minute = 2;
        cfg.cooldown_secs_after_trade = 0;

        let mut h = harness(cfg);
        let executor = OrderExecutor::new(h.runtime.port.clone());
        for _ in 0..5 {
            h.runtime.run_cycle(&executor).await;
        }

        assert_eq!(h.port.sent_orders().len(), 2);
        let executed = drain(&mut h.events)
            .iter()
            .filter(|e| matches!(e, Event::TradeExecuted { .. }))
            .count();
        assert_eq!(executed, 2);
    }

    // S4: three routed losing completions trip the streak gate; the pause is
    // sticky and suppresses all later submissions.
    #[tokio::test]
    async fn consecutive_losses_pause_the_bot() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into();
        cfg.min_signal_confidence = 0.0;
        cfg.max_consecutive_losses = 3;
        cfg.cooldown_secs_after_trade = 0;
        cfg.max_orders_per_minute = 100;

        let mut h = harness(cfg);
        for ticket in 1..=3 {
            h.completions_tx
                .send(TradeCompletion {
                    ticket,
                    profit: -5.0,
                })
                .unwrap();
        }

        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        assert_eq!(h.runtime.state.read().status, BotStatus::PausedProtection);
        assert!(h.port.sent_orders().is_empty());
        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::TradeError { kind, .. } if kind == "ProtectionPaused"
        )));

        // No auto-unpause: further cycles evaluate but never submit.
        for _ in 0..3 {
            h.runtime.run_cycle(&executor).await;
        }
        assert!(h.port.sent_orders().is_empty());
        assert_eq!(h.runtime.state.read().status, BotStatus::PausedProtection);
    }

    #[tokio::test]
    async fn low_confidence_suppresses() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into(); // fixed 0.9 confidence
        cfg.min_signal_confidence = 0.95;

        let mut h = harness(cfg);
        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        assert!(h.port.sent_orders().is_empty());
        let events = drain(&mut h.events);
        let update = events
            .iter()
            .find_map(|e| match e {
                Event::BotUpdate(u) => Some(u.clone()),
                _ => None,
            })
            .unwrap();
        assert!(update.cycle_outcome.contains("LowConfidence"));
    }

    #[tokio::test]
    async fn quote_outage_skips_the_cycle() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into();
        let mut h = harness(cfg);
        h.port.push_quote(Err(ControllerError::MarketDataUnavailable(
            "terminal offline".into(),
        )));

        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        assert!(h.port.sent_orders().is_empty());
        let events = drain(&mut h.events);
        let update = events
            .iter()
            .find_map(|e| match e {
                Event::BotUpdate(u) => Some(u.clone()),
                _ => None,
            })
            .unwrap();
        assert!(update.cycle_outcome.contains("MarketDataUnavailable"));
    }

    #[tokio::test]
    async fn completions_update_counters_and_emit_events() {
        let mut cfg = base_config();
        cfg.strategy_name = "always_signal".into();
        cfg.min_signal_confidence = 0.0;

        let mut h = harness(cfg);
        h.completions_tx
            .send(TradeCompletion {
                ticket: 9,
                profit: 12.5,
            })
            .unwrap();

        let executor = OrderExecutor::new(h.runtime.port.clone());
        h.runtime.run_cycle(&executor).await;

        let snapshot = h.runtime.state.write().protection.snapshot(Utc::now());
        assert_eq!(snapshot.trades_today, 1);
        assert!((snapshot.daily_pnl_realized - 12.5).abs() < 1e-9);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::TradeCompleted { ticket: 9, .. }
        )));
    }
}
