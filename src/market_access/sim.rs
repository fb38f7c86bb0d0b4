// =============================================================================
// Simulated Terminal — in-process market access for demo runs
// =============================================================================
//
// Drives the controller without a broker connection: quotes follow a bounded
// random walk per symbol, tick history accumulates in a capped ring, and
// orders fill instantly at the requested price against a local position book.
//
// The walk advances lazily — every `current_quote` call takes one step and
// records the resulting tick, so a polling bot sees a live-looking stream
// without a background task. History queries return the three raw record
// shapes in rotation so the normalization path is exercised end to end.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    AttributedTick, MarketAccess, OrderRequest, OrderResult, OrderRetcode, PositionInfo, Quote,
    RawTick, SymbolInfo, TickClass,
};
use crate::errors::ControllerError;
use crate::types::Side;

/// Ticks retained per symbol.
const TICK_RING_CAPACITY: usize = 4096;
/// Ticks pre-seeded when a symbol is registered.
const SEED_TICKS: usize = 120;

struct SymbolState {
    info: SymbolInfo,
    quote: Quote,
    /// Half-spread in price units, kept constant through the walk.
    half_spread: f64,
    ticks: VecDeque<(DateTime<Utc>, f64, f64)>,
    rng: StdRng,
}

impl SymbolState {
    /// Advance the random walk one step and record the tick.
    fn step(&mut self) {
        let mid = self.quote.mid();
        // Step size: up to 5 points per tick, either direction.
        let step = self.rng.gen_range(-5.0..=5.0) * self.info.point_size;
        let mid = (mid + step).max(self.info.point_size);

        let now = Utc::now();
        self.quote = Quote {
            bid: mid - self.half_spread,
            ask: mid + self.half_spread,
            ts: now,
        };

        self.ticks.push_back((now, self.quote.bid, self.quote.ask));
        while self.ticks.len() > TICK_RING_CAPACITY {
            self.ticks.pop_front();
        }
    }
}

/// In-process broker terminal simulation.
pub struct SimTerminal {
    symbols: RwLock<HashMap<String, SymbolState>>,
    positions: RwLock<HashMap<u64, PositionInfo>>,
    next_ticket: AtomicU64,
}

impl SimTerminal {
    pub fn new() -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Register a symbol with its metadata, a starting mid price, and a fixed
    /// spread in points. Seeds a short tick history so bots have a window to
    /// chew on from the first cycle.
    pub fn add_symbol(&self, symbol: &str, info: SymbolInfo, start_mid: f64, spread_points: f64) {
        let half_spread = spread_points * info.point_size / 2.0;
        let now = Utc::now();

        let mut state = SymbolState {
            info,
            quote: Quote {
                bid: start_mid - half_spread,
                ask: start_mid + half_spread,
                ts: now,
            },
            half_spread,
            ticks: VecDeque::with_capacity(TICK_RING_CAPACITY),
            rng: StdRng::from_entropy(),
        };

        // Backfill history, one tick per 500 ms.
        let mut mid = start_mid;
        for i in (1..=SEED_TICKS).rev() {
            let ts = now - Duration::milliseconds(500 * i as i64);
            let step = state.rng.gen_range(-5.0..=5.0) * info.point_size;
            mid = (mid + step).max(info.point_size);
            state
                .ticks
                .push_back((ts, mid - half_spread, mid + half_spread));
        }

        info!(symbol, start_mid, spread_points, "sim terminal symbol registered");
        self.symbols.write().insert(symbol.to_string(), state);
    }

    fn with_symbol<T>(
        &self,
        symbol: &str,
        f: impl FnOnce(&mut SymbolState) -> T,
    ) -> Result<T, ControllerError> {
        let mut symbols = self.symbols.write();
        let state = symbols
            .get_mut(symbol)
            .ok_or_else(|| ControllerError::MarketAccessUnavailable(format!("unknown symbol {symbol}")))?;
        Ok(f(state))
    }

    /// Rotate raw record shapes so every consumer path gets exercised.
    fn shape_tick(index: usize, ts: DateTime<Utc>, bid: f64, ask: f64) -> RawTick {
        match index % 3 {
            0 => RawTick::Structured {
                ts,
                fields: HashMap::from([("bid".to_string(), bid), ("ask".to_string(), ask)]),
            },
            1 => RawTick::Attributed(AttributedTick {
                ts: Some(ts),
                bid: Some(bid),
                ask: Some(ask),
                ..AttributedTick::default()
            }),
            _ => RawTick::Tuple {
                ts,
                values: vec![bid, ask],
            },
        }
    }
}

impl Default for SimTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketAccess for SimTerminal {
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ControllerError> {
        self.with_symbol(symbol, |s| s.info)
    }

    async fn current_quote(&self, symbol: &str) -> Result<Quote, ControllerError> {
        self.with_symbol(symbol, |s| {
            s.step();
            s.quote
        })
    }

    async fn ticks_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _class: TickClass,
    ) -> Result<Vec<RawTick>, ControllerError> {
        self.with_symbol(symbol, |s| {
            s.ticks
                .iter()
                .filter(|(ts, _, _)| *ts >= from && *ts <= to)
                .enumerate()
                .map(|(i, &(ts, bid, ask))| Self::shape_tick(i, ts, bid, ask))
                .collect()
        })
    }

    async fn ticks_from(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<RawTick>, ControllerError> {
        self.with_symbol(symbol, |s| {
            s.ticks
                .iter()
                .filter(|(ts, _, _)| *ts >= from)
                .take(count)
                .enumerate()
                .map(|(i, &(ts, bid, ask))| Self::shape_tick(i, ts, bid, ask))
                .collect()
        })
    }

    async fn positions(
        &self,
        symbol: Option<&str>,
        ticket: Option<u64>,
    ) -> Result<Vec<PositionInfo>, ControllerError> {
        let quotes: HashMap<String, Quote> = self
            .symbols
            .read()
            .iter()
            .map(|(sym, s)| (sym.clone(), s.quote))
            .collect();

        let positions = self.positions.read();
        Ok(positions
            .values()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .filter(|p| ticket.map_or(true, |t| p.ticket == t))
            .map(|p| {
                let mut p = p.clone();
                if let Some(q) = quotes.get(&p.symbol) {
                    // Marked against the crossing side.
                    p.current_price = match p.side {
                        Side::Buy => q.bid,
                        Side::Sell => q.ask,
                    };
                    p.unrealized_pnl =
                        (p.current_price - p.entry_price) * p.side.direction() * p.volume;
                }
                p
            })
            .collect())
    }

    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, ControllerError> {
        // The sim accepts every filling mode; mode-rejection paths are the
        // scripted terminal's job.
        if let Some(closing) = request.closes_ticket {
            let removed = self.positions.write().remove(&closing);
            let Some(position) = removed else {
                return Ok(OrderResult {
                    retcode: OrderRetcode::Rejected(10013),
                    ticket: None,
                    executed_price: None,
                    profit: None,
                    message: Some(format!("no position with ticket {closing}")),
                });
            };

            let profit = (request.price - position.entry_price)
                * position.side.direction()
                * position.volume;

            debug!(
                ticket = closing,
                profit,
                comment = %request.comment,
                "sim close deal filled"
            );
            return Ok(OrderResult {
                retcode: OrderRetcode::Done,
                ticket: Some(closing),
                executed_price: Some(request.price),
                profit: Some(profit),
                message: None,
            });
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let audit_id = Uuid::new_v4();

        self.positions.write().insert(
            ticket,
            PositionInfo {
                ticket,
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                entry_price: request.price,
                current_price: request.price,
                unrealized_pnl: 0.0,
                comment: request.comment.clone(),
                opened_at: Utc::now(),
            },
        );

        debug!(
            ticket,
            audit_id = %audit_id,
            symbol = %request.symbol,
            side = %request.side,
            price = request.price,
            "sim market order filled"
        );

        Ok(OrderResult {
            retcode: OrderRetcode::Done,
            ticket: Some(ticket),
            executed_price: Some(request.price),
            profit: None,
            message: None,
        })
    }
}
