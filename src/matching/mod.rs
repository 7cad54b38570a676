// auction_core/src/matching/mod.rs
//
// The Matching Engine.
//
// Owns a {symbol -> OrderBook} map, assigns globally monotonic order and
// trade ids, drives each submission's matching loop under price-time
// priority, and tracks latency/throughput statistics. No self-trade
// prevention, no pre-trade risk checks, no order modification or
// cancellation — this engine only ever accepts new limit orders.

pub mod orderbook;

pub use orderbook::{L2Level, Order, OrderBook, Trade};

use crate::error::OrderError;
use crate::types::{Price, Side};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Outcome of a single order submission.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub order_id: u64,
    pub trades: Vec<Trade>,
    pub remaining_quantity: i64,
}

/// Aggregate throughput and latency figures, mirroring the original's
/// `get_statistics()` report.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingStatistics {
    pub total_orders: u64,
    pub total_trades: u64,
    pub average_latency_ms: f64,
    pub symbols_traded: usize,
    pub match_rate: f64,
}

pub struct MatchingEngine {
    books: HashMap<String, OrderBook>,
    order_symbol: HashMap<u64, String>,
    symbols_seen: HashSet<String>,
    next_order_id: u64,
    next_trade_id: u64,
    ts_counter: u64,
    total_orders: u64,
    total_trades: u64,
    total_latency_ns: u128,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
            order_symbol: HashMap::new(),
            symbols_seen: HashSet::new(),
            next_order_id: 0,
            next_trade_id: 0,
            ts_counter: 0,
            total_orders: 0,
            total_trades: 0,
            total_latency_ns: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.ts_counter += 1;
        self.ts_counter
    }

    fn alloc_order_id(&mut self) -> u64 {
        self.next_order_id += 1;
        self.next_order_id
    }

    /// Validate an incoming order's raw fields before it touches a book.
    fn validate(symbol: &str, price: Price, quantity: i64) -> Result<(), OrderError> {
        if symbol.is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        if symbol.len() > 10 {
            return Err(OrderError::SymbolTooLong(symbol.to_string()));
        }
        if price.raw() <= 0 {
            return Err(OrderError::InvalidPrice(price.raw()));
        }
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        Ok(())
    }

    fn get_or_create_book(&mut self, symbol: &str) -> &mut OrderBook {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol.to_string()))
    }

    /// Submit a new limit order. Stamps order_id/timestamp, inserts it into
    /// its symbol's book, and runs the matching loop to exhaustion.
    pub fn submit_order(
        &mut self,
        user_id: u64,
        symbol: &str,
        side: Side,
        price: Price,
        quantity: i64,
    ) -> Result<MatchResult, OrderError> {
        Self::validate(symbol, price, quantity)?;
        let start = Instant::now();

        let ts = self.tick();
        let order_id = self.alloc_order_id();

        let order = Order {
            order_id,
            user_id,
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            filled_quantity: 0,
            timestamp: ts,
            status: crate::types::OrderStatus::Pending,
        };

        self.symbols_seen.insert(symbol.to_string());
        self.order_symbol.insert(order_id, symbol.to_string());

        let book = self.get_or_create_book(symbol);
        book.insert(order);

        let mut trade_id_counter = self.next_trade_id;
        let trades = book.run_matching_loop(ts, || {
            trade_id_counter += 1;
            trade_id_counter
        });
        self.next_trade_id = trade_id_counter;

        let remaining_quantity = book.get_order(order_id).map(Order::remaining).unwrap_or(0);

        self.total_orders += 1;
        self.total_trades += trades.len() as u64;
        self.total_latency_ns += start.elapsed().as_nanos();

        Ok(MatchResult {
            order_id,
            trades,
            remaining_quantity,
        })
    }

    /// O(1) order lookup by id, across all symbols.
    pub fn get_order(&self, order_id: u64) -> Option<&Order> {
        let symbol = self.order_symbol.get(&order_id)?;
        self.books.get(symbol)?.get_order(order_id)
    }

    pub fn best_buy(&self, symbol: &str) -> Option<Price> {
        self.books.get(symbol).and_then(OrderBook::best_buy)
    }

    pub fn best_sell(&self, symbol: &str) -> Option<Price> {
        self.books.get(symbol).and_then(OrderBook::best_sell)
    }

    pub fn spread(&self, symbol: &str) -> Option<Price> {
        self.books.get(symbol).and_then(OrderBook::spread)
    }

    /// Top-of-book snapshot, up to `depth` levels per side.
    pub fn snapshot(&self, symbol: &str, depth: usize) -> Option<(Vec<L2Level>, Vec<L2Level>)> {
        self.books.get(symbol).map(|b| b.snapshot(depth))
    }

    pub fn statistics(&self) -> MatchingStatistics {
        let average_latency_ms = if self.total_orders == 0 {
            0.0
        } else {
            (self.total_latency_ns as f64 / self.total_orders as f64) / 1_000_000.0
        };
        let match_rate = if self.total_orders == 0 {
            0.0
        } else {
            self.total_trades as f64 / self.total_orders as f64
        };
        MatchingStatistics {
            total_orders: self.total_orders,
            total_trades: self.total_trades,
            average_latency_ms,
            symbols_traded: self.symbols_seen.len(),
            match_rate,
        }
    }

    /// Clear all books and counters back to a pristine state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}
