// =============================================================================
// Event Router — push channel between the bots and the outside world
// =============================================================================
//
// Every bot publishes one `bot_update` per loop cycle plus the lifecycle and
// trade events. The router fans them out on a tokio broadcast channel: lossy
// for slow subscribers, order-preserving per publisher. Each envelope carries
// a router-wide sequence number so subscribers can detect drops.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::market_access::Quote;
use crate::protection::PerformanceSnapshot;
use crate::strategies::Signal;
use crate::types::{BotId, BotStatus, Side};

/// Broadcast buffer depth; slow subscribers past this lag see `Lagged`.
const CHANNEL_CAPACITY: usize = 1024;

/// One per-cycle state push for a bot.
#[derive(Debug, Clone, Serialize)]
pub struct BotUpdate {
    pub bot_id: BotId,
    pub status: BotStatus,
    pub last_quote: Option<Quote>,
    pub last_signal: Option<Signal>,
    pub performance: PerformanceSnapshot,
    pub next_analysis_in_secs: u64,
    /// What the cycle did (e.g. "trade_executed", "NoSignal", a gate reason).
    pub cycle_outcome: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BotStarted {
        bot_id: BotId,
        symbol: String,
        strategy: String,
    },
    BotUpdate(BotUpdate),
    TradeExecuted {
        bot_id: BotId,
        ticket: u64,
        direction: Side,
        volume: f64,
        entry_price: f64,
        sl_price: f64,
        tp_price: f64,
    },
    TradeCompleted {
        bot_id: BotId,
        ticket: u64,
        profit: f64,
    },
    TradeError {
        bot_id: BotId,
        kind: String,
        message: String,
    },
    BotStopped {
        bot_id: BotId,
    },
}

impl Event {
    /// The bot this event belongs to.
    pub fn bot_id(&self) -> BotId {
        match self {
            Self::BotStarted { bot_id, .. }
            | Self::TradeExecuted { bot_id, .. }
            | Self::TradeCompleted { bot_id, .. }
            | Self::TradeError { bot_id, .. }
            | Self::BotStopped { bot_id } => *bot_id,
            Self::BotUpdate(update) => update.bot_id,
        }
    }
}

/// Sequenced, timestamped wrapper actually sent to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

/// Cheaply clonable handle onto the shared channel.
#[derive(Clone)]
pub struct EventRouter {
    tx: broadcast::Sender<EventEnvelope>,
    seq: Arc<AtomicU64>,
}

impl EventRouter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish to all current subscribers. Events published with nobody
    /// listening are dropped; that is fine, the channel is lossy by contract.
    pub fn publish(&self, event: Event) {
        let envelope = EventEnvelope {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            at: Utc::now(),
            event,
        };
        debug!(seq = envelope.seq, bot_id = envelope.event.bot_id(), "event published");
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let router = EventRouter::new();
        let mut rx = router.subscribe();

        router.publish(Event::BotStarted {
            bot_id: 1,
            symbol: "ETHUSD".into(),
            strategy: "rsi".into(),
        });
        router.publish(Event::BotStopped { bot_id: 1 });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert!(matches!(first.event, Event::BotStarted { .. }));
        assert!(matches!(second.event, Event::BotStopped { .. }));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let router = EventRouter::new();
        router.publish(Event::BotStopped { bot_id: 9 });

        // A later subscriber only sees later events.
        let mut rx = router.subscribe();
        router.publish(Event::BotStopped { bot_id: 10 });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.bot_id(), 10);
        assert_eq!(envelope.seq, 1);
    }

    #[test]
    fn envelope_serialises_with_flattened_type_tag() {
        let envelope = EventEnvelope {
            seq: 3,
            at: Utc::now(),
            event: Event::TradeCompleted {
                bot_id: 7,
                ticket: 55,
                profit: -1.25,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "trade_completed");
        assert_eq!(json["bot_id"], 7);
        assert_eq!(json["seq"], 3);
    }
}
