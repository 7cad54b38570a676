// auction_core/src/matching/orderbook.rs
//
// Per-symbol order book. Orders live in an arena keyed by order_id; the two
// price-level queues hold only order_ids, so the "heap entry" and the
// "order index" are the same mutable record by construction instead of two
// aliased copies. Orders are only ever removed from the head of a level —
// interior orders can't reach zero remaining quantity because only a head
// order can be matched, so lazy cleanup at the heads is sufficient and no
// tombstones are needed.
//
// Cancellation is not implemented: this book never removes a resting order
// except by filling it, so the arena entries are append-only for the
// lifetime of the book.

use crate::types::{OrderStatus, Price, Side};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A resting or just-submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: u64,
    pub user_id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub timestamp: u64,
    pub status: OrderStatus,
}

impl Order {
    pub fn remaining(&self) -> i64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.remaining() == 0
    }
}

/// A single execution between a resting buy and a resting sell.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub symbol: String,
    pub price: Price,
    pub quantity: i64,
    pub timestamp: u64,
}

/// One price level in a top-of-book snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2Level {
    pub price: Price,
    pub quantity: i64,
}

/// One side of the book: price levels, each a FIFO queue of order ids.
/// `ascending` controls best-price lookup: asks want the lowest price
/// first, bids want the highest.
#[derive(Debug, Default)]
struct BookSide {
    levels: BTreeMap<i64, VecDeque<u64>>,
    ascending: bool,
}

impl BookSide {
    fn new(ascending: bool) -> Self {
        Self {
            levels: BTreeMap::new(),
            ascending,
        }
    }

    fn best_price(&self) -> Option<i64> {
        if self.ascending {
            self.levels.keys().next().copied()
        } else {
            self.levels.keys().next_back().copied()
        }
    }

    fn insert(&mut self, price: i64, order_id: u64) {
        self.levels.entry(price).or_default().push_back(order_id);
    }

    fn head_id(&self) -> Option<u64> {
        let best = self.best_price()?;
        self.levels.get(&best)?.front().copied()
    }

    /// Pop zero-remaining orders from the head of the best level, then drop
    /// the level entirely once its queue empties.
    fn clean_head(&mut self, arena: &HashMap<u64, Order>) {
        loop {
            let best = match self.best_price() {
                Some(p) => p,
                None => return,
            };
            let level = self.levels.get_mut(&best).unwrap();
            while let Some(&id) = level.front() {
                if arena[&id].is_fully_filled() {
                    level.pop_front();
                } else {
                    break;
                }
            }
            if level.is_empty() {
                self.levels.remove(&best);
            } else {
                return;
            }
        }
    }

    fn snapshot(&self, depth: usize, arena: &HashMap<u64, Order>) -> Vec<L2Level> {
        let prices: Vec<i64> = if self.ascending {
            self.levels.keys().take(depth).copied().collect()
        } else {
            self.levels.keys().rev().take(depth).copied().collect()
        };
        prices
            .into_iter()
            .map(|p| {
                let qty: i64 = self.levels[&p].iter().map(|id| arena[id].remaining()).sum();
                L2Level {
                    price: Price::new(p),
                    quantity: qty,
                }
            })
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A single symbol's two-sided book and its order arena.
pub struct OrderBook {
    pub symbol: String,
    orders: HashMap<u64, Order>,
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            orders: HashMap::new(),
            bids: BookSide::new(false),
            asks: BookSide::new(true),
        }
    }

    pub fn best_buy(&self) -> Option<Price> {
        self.bids.best_price().map(Price::new)
    }

    pub fn best_sell(&self) -> Option<Price> {
        self.asks.best_price().map(Price::new)
    }

    /// O(1) order index lookup, shared with the heap entries by construction.
    pub fn get_order(&self, order_id: u64) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    fn can_match(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(buy), Some(sell)) => buy >= sell,
            _ => false,
        }
    }

    pub fn insert(&mut self, order: Order) {
        let id = order.order_id;
        let price = order.price.raw();
        let side = order.side;
        self.orders.insert(id, order);
        match side {
            Side::Buy => self.bids.insert(price, id),
            Side::Sell => self.asks.insert(price, id),
        }
    }

    /// Run the matching loop to exhaustion, assigning trade ids via
    /// `next_trade_id` and stamping each trade with `ts`. Returns the trades
    /// produced, in iteration order.
    pub fn run_matching_loop(
        &mut self,
        ts: u64,
        mut next_trade_id: impl FnMut() -> u64,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();
        while self.can_match() {
            let buy_id = self.bids.head_id().expect("can_match implies a buy head");
            let sell_id = self.asks.head_id().expect("can_match implies a sell head");

            let (buy_ts, buy_price, buy_remaining) = {
                let o = &self.orders[&buy_id];
                (o.timestamp, o.price, o.remaining())
            };
            let (sell_ts, sell_price, sell_remaining) = {
                let o = &self.orders[&sell_id];
                (o.timestamp, o.price, o.remaining())
            };
            let qty = buy_remaining.min(sell_remaining);

            // Pricing rule: whichever side arrived first sets the price.
            // Ties go to the buy side.
            let trade_price = if buy_ts <= sell_ts { buy_price } else { sell_price };

            {
                let buy = self.orders.get_mut(&buy_id).unwrap();
                let filled_before = buy.filled_quantity;
                buy.filled_quantity += qty;
                buy.status = OrderStatus::after_fill(filled_before, buy.remaining());
            }
            {
                let sell = self.orders.get_mut(&sell_id).unwrap();
                let filled_before = sell.filled_quantity;
                sell.filled_quantity += qty;
                sell.status = OrderStatus::after_fill(filled_before, sell.remaining());
            }

            trades.push(Trade {
                trade_id: next_trade_id(),
                buy_order_id: buy_id,
                sell_order_id: sell_id,
                symbol: self.symbol.clone(),
                price: trade_price,
                quantity: qty,
                timestamp: ts,
            });

            self.bids.clean_head(&self.orders);
            self.asks.clean_head(&self.orders);
        }
        trades
    }

    pub fn snapshot(&self, depth: usize) -> (Vec<L2Level>, Vec<L2Level>) {
        (
            self.bids.snapshot(depth, &self.orders),
            self.asks.snapshot(depth, &self.orders),
        )
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_buy(), self.best_sell()) {
            (Some(b), Some(s)) => Some(s - b),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(id: u64, user: u64, side: Side, price: &str, qty: i64, ts: u64) -> Order {
        Order {
            order_id: id,
            user_id: user,
            symbol: "AAPL".to_string(),
            side,
            price: Price::from_str_decimal(price).unwrap(),
            quantity: qty,
            filled_quantity: 0,
            timestamp: ts,
            status: OrderStatus::Pending,
        }
    }

    fn run(book: &mut OrderBook) -> Vec<Trade> {
        let mut counter = 0u64;
        book.run_matching_loop(10, || {
            counter += 1;
            counter
        })
    }

    #[test]
    fn test_no_match_until_crossed() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Buy, "100.00", 100, 1));
        book.insert(mk(2, 2, Side::Sell, "150.00", 100, 2));
        let trades = run(&mut book);
        assert!(trades.is_empty());
        assert_eq!(book.spread(), Some(Price::from_str_decimal("50.00").unwrap()));
    }

    #[test]
    fn test_buy_arrives_first_wins_price() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Buy, "150.00", 100, 1));
        book.insert(mk(2, 2, Side::Sell, "149.00", 100, 2));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Price::from_str_decimal("150.00").unwrap());
        assert_eq!(trades[0].quantity, 100);
        assert_eq!(book.get_order(1).unwrap().status, OrderStatus::Filled);
        assert_eq!(book.get_order(2).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_tie_on_timestamp_goes_to_buy() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Sell, "150.00", 50, 5));
        book.insert(mk(2, 2, Side::Buy, "150.00", 50, 5));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Price::from_str_decimal("150.00").unwrap());
    }

    #[test]
    fn test_price_time_priority_earlier_order_matched_first() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Buy, "150.00", 100, 1));
        book.insert(mk(2, 2, Side::Buy, "150.00", 100, 2));
        book.insert(mk(3, 3, Side::Sell, "150.00", 100, 3));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].buy_order_id, 1);
        assert_eq!(book.best_buy(), Some(Price::from_str_decimal("150.00").unwrap()));
        assert_eq!(book.get_order(2).unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn test_partial_fill_leaves_remainder_resting() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Buy, "150.00", 100, 1));
        book.insert(mk(2, 2, Side::Sell, "150.00", 50, 2));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 50);
        assert_eq!(book.best_buy(), Some(Price::from_str_decimal("150.00").unwrap()));
        assert_eq!(book.best_sell(), None);
        assert_eq!(book.get_order(1).unwrap().status, OrderStatus::Partial);
        assert_eq!(book.get_order(2).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_multiple_levels_consumed_best_price_first() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Sell, "100.00", 10, 1));
        book.insert(mk(2, 2, Side::Sell, "101.00", 10, 2));
        book.insert(mk(3, 3, Side::Sell, "102.00", 10, 3));
        book.insert(mk(4, 4, Side::Buy, "102.00", 25, 4));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].quantity, 10);
        assert_eq!(trades[1].quantity, 10);
        assert_eq!(trades[2].quantity, 5);
        assert_eq!(book.best_sell(), Some(Price::from_str_decimal("102.00").unwrap()));
    }

    #[test]
    fn test_snapshot_depth_and_ordering() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Buy, "99.00", 10, 1));
        book.insert(mk(2, 2, Side::Buy, "100.00", 20, 2));
        book.insert(mk(3, 3, Side::Sell, "101.00", 15, 3));
        book.insert(mk(4, 4, Side::Sell, "102.00", 25, 4));
        let (bids, asks) = book.snapshot(5);
        assert_eq!(bids.len(), 2);
        assert_eq!(asks.len(), 2);
        assert_eq!(bids[0].price, Price::from_str_decimal("100.00").unwrap());
        assert_eq!(asks[0].price, Price::from_str_decimal("101.00").unwrap());
    }

    #[test]
    fn test_self_trading_permitted() {
        let mut book = OrderBook::new("AAPL");
        book.insert(mk(1, 1, Side::Sell, "100.00", 10, 1));
        book.insert(mk(2, 1, Side::Buy, "100.00", 10, 2));
        let trades = run(&mut book);
        assert_eq!(trades.len(), 1);
    }
}
