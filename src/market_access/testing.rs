// =============================================================================
// Scripted terminal for unit tests
// =============================================================================
//
// Deterministic MarketAccess double: tests queue the responses they want, the
// terminal replays them in order and records every order it is sent. Queues
// fall back to a steady default so a test only scripts the calls it cares
// about.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    MarketAccess, OrderRequest, OrderResult, OrderRetcode, PositionInfo, Quote, RawTick,
    SymbolInfo, TickClass,
};
use crate::errors::ControllerError;

type RangeResponse = Result<Vec<RawTick>, ControllerError>;

#[derive(Default)]
pub struct ScriptedTerminal {
    infos: Mutex<HashMap<String, SymbolInfo>>,
    steady_quote: Mutex<Option<Quote>>,
    quotes: Mutex<VecDeque<Result<Quote, ControllerError>>>,
    range_responses: Mutex<VecDeque<RangeResponse>>,
    from_responses: Mutex<VecDeque<RangeResponse>>,
    order_results: Mutex<VecDeque<OrderResult>>,
    positions_response: Mutex<Vec<PositionInfo>>,
    sent_orders: Mutex<Vec<OrderRequest>>,
    next_ticket: AtomicU64,
}

impl ScriptedTerminal {
    pub fn new() -> Self {
        Self {
            next_ticket: AtomicU64::new(1000),
            ..Self::default()
        }
    }

    pub fn set_symbol(&self, symbol: &str, info: SymbolInfo) {
        self.infos.lock().insert(symbol.to_string(), info);
    }

    /// Steady quote returned whenever the scripted queue is empty.
    pub fn set_quote(&self, quote: Quote) {
        *self.steady_quote.lock() = Some(quote);
    }

    pub fn push_quote(&self, quote: Result<Quote, ControllerError>) {
        self.quotes.lock().push_back(quote);
    }

    /// Queue one response for the next `ticks_range` call.
    pub fn push_range_response(&self, response: RangeResponse) {
        self.range_responses.lock().push_back(response);
    }

    /// Queue one response for the next `ticks_from` call.
    pub fn push_from_response(&self, response: RangeResponse) {
        self.from_responses.lock().push_back(response);
    }

    /// Queue one result for the next `order_send` call. With the queue empty,
    /// orders succeed with an auto-assigned ticket.
    pub fn push_order_result(&self, result: OrderResult) {
        self.order_results.lock().push_back(result);
    }

    pub fn set_positions(&self, positions: Vec<PositionInfo>) {
        *self.positions_response.lock() = positions;
    }

    /// Every order this terminal has been sent, in order.
    pub fn sent_orders(&self) -> Vec<OrderRequest> {
        self.sent_orders.lock().clone()
    }
}

#[async_trait]
impl MarketAccess for ScriptedTerminal {
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ControllerError> {
        self.infos.lock().get(symbol).copied().ok_or_else(|| {
            ControllerError::MarketAccessUnavailable(format!("unknown symbol {symbol}"))
        })
    }

    async fn current_quote(&self, _symbol: &str) -> Result<Quote, ControllerError> {
        if let Some(scripted) = self.quotes.lock().pop_front() {
            return scripted;
        }
        (*self.steady_quote.lock()).ok_or_else(|| {
            ControllerError::MarketDataUnavailable("no scripted quote".to_string())
        })
    }

    async fn ticks_range(
        &self,
        _symbol: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _class: TickClass,
    ) -> Result<Vec<RawTick>, ControllerError> {
        self.range_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn ticks_from(
        &self,
        _symbol: &str,
        _from: DateTime<Utc>,
        _count: usize,
    ) -> Result<Vec<RawTick>, ControllerError> {
        self.from_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn positions(
        &self,
        symbol: Option<&str>,
        ticket: Option<u64>,
    ) -> Result<Vec<PositionInfo>, ControllerError> {
        Ok(self
            .positions_response
            .lock()
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .filter(|p| ticket.map_or(true, |t| p.ticket == t))
            .cloned()
            .collect())
    }

    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, ControllerError> {
        self.sent_orders.lock().push(request.clone());

        if let Some(scripted) = self.order_results.lock().pop_front() {
            return Ok(scripted);
        }

        Ok(OrderResult {
            retcode: OrderRetcode::Done,
            ticket: Some(self.next_ticket.fetch_add(1, Ordering::SeqCst)),
            executed_price: Some(request.price),
            profit: None,
            message: None,
        })
    }
}
