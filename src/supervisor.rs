// =============================================================================
// Bot Supervisor — creates, schedules, and terminates the bot fleet
// =============================================================================
//
// The supervisor is the sole creator and destroyer of bots. It validates the
// config, checks the symbol against the market access port, assigns a
// monotonically increasing id, and spawns the loop task. `stop` flips the
// bot's watch flag; the loop observes it at its next suspension point, runs
// its finalizer, and emits the single `bot_stopped` event.
//
// Completed orders observed externally are routed back by parsing the order
// tag: the recovered bot id selects the owning bot's completion queue, so no
// shared memory ties the terminal's history to bot state.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bot::{BotRuntime, BotState, TradeCompletion};
use crate::config::BotConfig;
use crate::errors::ControllerError;
use crate::events::{BotUpdate, Event, EventEnvelope, EventRouter};
use crate::executor::parse_order_comment;
use crate::market_access::MarketAccess;
use crate::protection::PerformanceSnapshot;
use crate::types::{BotId, BotStatus};

/// Snapshot of one bot for the console.
#[derive(Debug, Clone, Serialize)]
pub struct BotDetails {
    pub bot_id: BotId,
    pub symbol: String,
    pub strategy: String,
    pub status: BotStatus,
    pub performance: PerformanceSnapshot,
    pub config: BotConfig,
}

struct BotHandle {
    config: BotConfig,
    state: Arc<RwLock<BotState>>,
    stop_tx: watch::Sender<bool>,
    completions_tx: mpsc::UnboundedSender<TradeCompletion>,
    task: JoinHandle<()>,
}

pub struct Supervisor {
    port: Arc<dyn MarketAccess>,
    router: EventRouter,
    next_id: AtomicU64,
    bots: RwLock<HashMap<BotId, BotHandle>>,
}

impl Supervisor {
    pub fn new(port: Arc<dyn MarketAccess>, router: EventRouter) -> Self {
        Self {
            port,
            router,
            next_id: AtomicU64::new(1),
            bots: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to the shared event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.router.subscribe()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Validate the config, probe the symbol, and launch a new bot.
    pub async fn start(&self, config: BotConfig) -> Result<BotId, ControllerError> {
        config.validate()?;
        let info = self.port.symbol_info(&config.symbol).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(RwLock::new(BotState::new()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let runtime = BotRuntime {
            id,
            config: config.clone(),
            info,
            state: state.clone(),
            port: self.port.clone(),
            router: self.router.clone(),
            completions,
            stop_rx,
        };
        let task = tokio::spawn(runtime.run());

        self.bots.write().insert(
            id,
            BotHandle {
                config,
                state,
                stop_tx,
                completions_tx,
                task,
            },
        );

        info!(bot_id = id, "bot registered");
        Ok(id)
    }

    /// Signal a bot to stop. Idempotent: a second call (or an unknown id) is
    /// a no-op, so `bot_stopped` fires at most once per bot.
    pub fn stop(&self, bot_id: BotId) {
        let handle = self.bots.write().remove(&bot_id);
        match handle {
            Some(handle) => {
                let _ = handle.stop_tx.send(true);
                info!(bot_id, "stop signalled");
                // The loop finishes its current cycle and finalizes itself;
                // the handle is dropped, nothing else may retain the bot.
                drop(handle.task);
            }
            None => {
                info!(bot_id, "stop ignored; bot not registered");
            }
        }
    }

    /// Stop every bot (service shutdown).
    pub fn stop_all(&self) {
        let ids: Vec<BotId> = self.bots.read().keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Operator action: lift a protection pause.
    pub fn resume(&self, bot_id: BotId) -> bool {
        let bots = self.bots.read();
        let Some(handle) = bots.get(&bot_id) else {
            return false;
        };
        let mut state = handle.state.write();
        if state.status == BotStatus::PausedProtection {
            state.status = BotStatus::Running;
            info!(bot_id, "protection pause lifted by operator");
            true
        } else {
            false
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn list_active(&self) -> Vec<BotDetails> {
        let now = chrono::Utc::now();
        self.bots
            .read()
            .iter()
            .map(|(&id, handle)| Self::details_for(id, handle, now))
            .collect()
    }

    pub fn get_details(&self, bot_id: BotId) -> Option<BotDetails> {
        let now = chrono::Utc::now();
        self.bots
            .read()
            .get(&bot_id)
            .map(|handle| Self::details_for(bot_id, handle, now))
    }

    /// Publish an immediate `bot_update` for one bot, outside its cycle
    /// cadence.
    pub fn force_performance_update(&self, bot_id: BotId) -> bool {
        let now = chrono::Utc::now();
        let update = {
            let bots = self.bots.read();
            let Some(handle) = bots.get(&bot_id) else {
                return false;
            };
            let mut state = handle.state.write();
            BotUpdate {
                bot_id,
                status: state.status,
                last_quote: state.last_quote,
                last_signal: state.last_signal.clone(),
                performance: state.protection.snapshot(now),
                next_analysis_in_secs: handle.config.analysis_interval_secs,
                cycle_outcome: "forced_update".to_string(),
            }
        };
        self.router.publish(Event::BotUpdate(update));
        true
    }

    fn details_for(id: BotId, handle: &BotHandle, now: chrono::DateTime<chrono::Utc>) -> BotDetails {
        let mut state = handle.state.write();
        BotDetails {
            bot_id: id,
            symbol: handle.config.symbol.clone(),
            strategy: handle.config.strategy_name.clone(),
            status: state.status,
            performance: state.protection.snapshot(now),
            config: handle.config.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Completion routing
    // -------------------------------------------------------------------------

    /// Route a completed order back to its owner by parsing the attribution
    /// tag. Returns false for foreign tags and stopped bots.
    pub fn route_completed_order(&self, comment: &str, ticket: u64, profit: f64) -> bool {
        let Some((bot_id, _, _)) = parse_order_comment(comment) else {
            return false;
        };

        let bots = self.bots.read();
        let Some(handle) = bots.get(&bot_id) else {
            warn!(bot_id, ticket, "completion for unknown or stopped bot dropped");
            return false;
        };

        handle
            .completions_tx
            .send(TradeCompletion { ticket, profit })
            .is_ok()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("bots", &self.bots.read().len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
