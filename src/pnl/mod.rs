// auction_core/src/pnl/mod.rs
//
// The Position & P&L Engine.
//
// Positions are a single signed quantity per (user, symbol) — no separate
// long/short slots. Every trade event folds in twice at the call site: once
// as a BUY for the buyer, once as a SELL for the seller. Realized P&L only
// moves on a fill that reduces |quantity|; opening or extending a position
// only moves avg_cost.

use crate::types::{Price, Side};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub user_id: u64,
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: Price,
    pub realized_pnl: Price,
}

impl Position {
    fn flat(user_id: u64, symbol: &str) -> Self {
        Self {
            user_id,
            symbol: symbol.to_string(),
            quantity: 0,
            avg_cost: Price::ZERO,
            realized_pnl: Price::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSummary {
    pub position: Position,
    pub unrealized_pnl: Price,
    pub total_pnl: Price,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPnLReport {
    pub user_id: u64,
    pub positions: Vec<PositionSummary>,
    pub total_realized_pnl: Price,
    pub total_unrealized_pnl: Price,
    pub total_pnl: Price,
    /// Number of reportable positions (len of `positions`), carried over from
    /// the original's per-user portfolio summary.
    pub num_positions: usize,
    /// Trade legs this user has participated in since the engine started
    /// (or was last reset). The original declares this field on its report
    /// dataclass but never increments it; this crate actually counts it.
    pub num_trades: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPnLReport {
    pub reports: Vec<UserPnLReport>,
    pub num_users: usize,
    pub total_realized_pnl: Price,
    pub total_unrealized_pnl: Price,
    pub total_pnl: Price,
}

/// A position change ready to hand to the persistence boundary. `quantity_delta`
/// and `realized_pnl_delta` are deltas since the last flush, not absolute
/// values — the store's upsert is additive on those two fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionDelta {
    pub user_id: u64,
    pub symbol: String,
    pub quantity_delta: i64,
    pub avg_cost: Price,
    pub realized_pnl_delta: Price,
}

type PositionKey = (u64, String);

pub struct PnLEngine {
    positions: HashMap<PositionKey, Position>,
    marks: HashMap<String, Price>,
    /// (quantity, realized_pnl) as of the last `flush_deltas` call, used to
    /// compute true deltas for the persistence boundary instead of passing
    /// an absolute quantity into an additive upsert.
    last_flushed: HashMap<PositionKey, (i64, Price)>,
    trade_counts: HashMap<u64, u64>,
}

impl PnLEngine {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            marks: HashMap::new(),
            last_flushed: HashMap::new(),
            trade_counts: HashMap::new(),
        }
    }

    fn key(user_id: u64, symbol: &str) -> PositionKey {
        (user_id, symbol.to_string())
    }

    /// Fold one (user, side, price, quantity) event into its position.
    /// Call once per side of every trade.
    pub fn process_trade(
        &mut self,
        user_id: u64,
        symbol: &str,
        side: Side,
        price: Price,
        quantity: i64,
    ) -> &Position {
        let key = Self::key(user_id, symbol);
        *self.trade_counts.entry(user_id).or_insert(0) += 1;
        let pos = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::flat(user_id, symbol));

        let q = pos.quantity;
        match side {
            Side::Buy => {
                if q >= 0 {
                    // Open/extend long.
                    pos.avg_cost = Price::weighted_avg(pos.avg_cost, q, price, quantity);
                    pos.quantity = q + quantity;
                } else {
                    // Close/reduce/flip short.
                    let abs_q = -q;
                    if quantity <= abs_q {
                        let diff = pos.avg_cost - price;
                        pos.realized_pnl = pos.realized_pnl + Price::new(diff.notional(quantity));
                        pos.quantity = q + quantity;
                        if pos.quantity == 0 {
                            pos.avg_cost = Price::ZERO;
                        }
                    } else {
                        let diff = pos.avg_cost - price;
                        pos.realized_pnl = pos.realized_pnl + Price::new(diff.notional(abs_q));
                        pos.quantity = quantity - abs_q;
                        pos.avg_cost = price;
                    }
                }
            }
            Side::Sell => {
                if q <= 0 {
                    // Open/extend short.
                    pos.avg_cost = Price::weighted_avg(pos.avg_cost, -q, price, quantity);
                    pos.quantity = q - quantity;
                } else {
                    // Close/reduce/flip long.
                    if quantity <= q {
                        let diff = price - pos.avg_cost;
                        pos.realized_pnl = pos.realized_pnl + Price::new(diff.notional(quantity));
                        pos.quantity = q - quantity;
                        if pos.quantity == 0 {
                            pos.avg_cost = Price::ZERO;
                        }
                    } else {
                        let diff = price - pos.avg_cost;
                        pos.realized_pnl = pos.realized_pnl + Price::new(diff.notional(q));
                        pos.quantity = -(quantity - q);
                        pos.avg_cost = price;
                    }
                }
            }
        }

        self.positions.get(&key).unwrap()
    }

    /// Fold both legs of a single trade at once.
    pub fn process_match(
        &mut self,
        buy_user_id: u64,
        sell_user_id: u64,
        symbol: &str,
        price: Price,
        quantity: i64,
    ) {
        self.process_trade(buy_user_id, symbol, Side::Buy, price, quantity);
        self.process_trade(sell_user_id, symbol, Side::Sell, price, quantity);
    }

    pub fn set_current_price(&mut self, symbol: &str, price: Price) {
        self.marks.insert(symbol.to_string(), price);
    }

    pub fn get_position(&self, user_id: u64, symbol: &str) -> Option<&Position> {
        self.positions.get(&Self::key(user_id, symbol))
    }

    pub fn unrealized_pnl(&self, user_id: u64, symbol: &str) -> Price {
        let pos = match self.positions.get(&Self::key(user_id, symbol)) {
            Some(p) => p,
            None => return Price::ZERO,
        };
        let mark = match self.marks.get(symbol) {
            Some(m) => *m,
            None => return Price::ZERO,
        };
        if pos.quantity > 0 {
            Price::new((mark - pos.avg_cost).notional(pos.quantity))
        } else if pos.quantity < 0 {
            Price::new((pos.avg_cost - mark).notional(-pos.quantity))
        } else {
            Price::ZERO
        }
    }

    pub fn get_position_summary(&self, user_id: u64, symbol: &str) -> Option<PositionSummary> {
        let position = self.positions.get(&Self::key(user_id, symbol))?.clone();
        let unrealized_pnl = self.unrealized_pnl(user_id, symbol);
        let total_pnl = position.realized_pnl + unrealized_pnl;
        Some(PositionSummary {
            position,
            unrealized_pnl,
            total_pnl,
        })
    }

    /// Per-user report: every position with nonzero quantity or nonzero
    /// realized P&L, sorted by symbol for determinism.
    pub fn generate_user_report(&self, user_id: u64) -> UserPnLReport {
        let mut positions = Vec::new();
        let mut total_realized_pnl = Price::ZERO;
        let mut total_unrealized_pnl = Price::ZERO;

        for ((uid, symbol), pos) in self.positions.iter() {
            if *uid != user_id {
                continue;
            }
            if pos.is_flat() && pos.realized_pnl.is_zero() {
                continue;
            }
            let unrealized = self.unrealized_pnl(user_id, symbol);
            total_realized_pnl = total_realized_pnl + pos.realized_pnl;
            total_unrealized_pnl = total_unrealized_pnl + unrealized;
            positions.push(PositionSummary {
                position: pos.clone(),
                unrealized_pnl: unrealized,
                total_pnl: pos.realized_pnl + unrealized,
            });
        }
        positions.sort_by(|a, b| a.position.symbol.cmp(&b.position.symbol));
        let num_positions = positions.len();

        UserPnLReport {
            user_id,
            positions,
            total_realized_pnl,
            total_unrealized_pnl,
            total_pnl: total_realized_pnl + total_unrealized_pnl,
            num_positions,
            num_trades: self.trade_counts.get(&user_id).copied().unwrap_or(0),
        }
    }

    /// Portfolio report: one entry per user with any reportable position,
    /// sorted by total P&L descending.
    pub fn generate_portfolio_report(&self) -> PortfolioPnLReport {
        let users: std::collections::HashSet<u64> =
            self.positions.keys().map(|(uid, _)| *uid).collect();
        let mut reports: Vec<UserPnLReport> = users
            .into_iter()
            .map(|uid| self.generate_user_report(uid))
            .filter(|r| !r.positions.is_empty())
            .collect();
        reports.sort_by(|a, b| b.total_pnl.raw().cmp(&a.total_pnl.raw()));

        let total_realized_pnl = reports.iter().fold(Price::ZERO, |acc, r| acc + r.total_realized_pnl);
        let total_unrealized_pnl = reports.iter().fold(Price::ZERO, |acc, r| acc + r.total_unrealized_pnl);
        PortfolioPnLReport {
            num_users: reports.len(),
            total_realized_pnl,
            total_unrealized_pnl,
            total_pnl: total_realized_pnl + total_unrealized_pnl,
            reports,
        }
    }

    /// Compute deltas since the last flush for every touched position and
    /// advance the flush watermark. This is what should be handed to
    /// `PersistenceStore::upsert_position`, never the absolute quantity.
    pub fn flush_deltas(&mut self) -> Vec<PositionDelta> {
        let mut deltas = Vec::new();
        for (key, pos) in self.positions.iter() {
            let (last_qty, last_realized) =
                self.last_flushed.get(key).copied().unwrap_or((0, Price::ZERO));
            let quantity_delta = pos.quantity - last_qty;
            let realized_pnl_delta = pos.realized_pnl - last_realized;
            if quantity_delta == 0 && realized_pnl_delta.is_zero() {
                continue;
            }
            deltas.push(PositionDelta {
                user_id: pos.user_id,
                symbol: pos.symbol.clone(),
                quantity_delta,
                avg_cost: pos.avg_cost,
                realized_pnl_delta,
            });
        }
        for (key, pos) in self.positions.iter() {
            self.last_flushed
                .insert(key.clone(), (pos.quantity, pos.realized_pnl));
        }
        deltas
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.marks.clear();
        self.last_flushed.clear();
        self.trade_counts.clear();
    }
}

impl Default for PnLEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Price {
        Price::from_str_decimal(s).unwrap()
    }

    #[test]
    fn test_scenario_e_long_round_trip_profit() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Sell, p("110.00"), 10);
        let pos = engine.get_position(1, "AAPL").unwrap();
        assert_eq!(pos.quantity, 0);
        assert_eq!(pos.realized_pnl, p("100.00"));
        assert_eq!(pos.avg_cost, Price::ZERO);
    }

    #[test]
    fn test_scenario_f_weighted_average() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Buy, p("110.00"), 10);
        let pos = engine.get_position(1, "AAPL").unwrap();
        assert_eq!(pos.quantity, 20);
        assert_eq!(pos.avg_cost, p("105.00"));
    }

    #[test]
    fn test_scenario_g_long_to_short_flip() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Sell, p("110.00"), 15);
        let pos = engine.get_position(1, "AAPL").unwrap();
        assert_eq!(pos.realized_pnl, p("100.00"));
        assert_eq!(pos.quantity, -5);
        assert_eq!(pos.avg_cost, p("110.00"));
    }

    #[test]
    fn test_short_round_trip_profit() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Sell, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Buy, p("90.00"), 10);
        let pos = engine.get_position(1, "AAPL").unwrap();
        assert_eq!(pos.quantity, 0);
        assert_eq!(pos.realized_pnl, p("100.00"));
    }

    #[test]
    fn test_short_to_long_flip() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Sell, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Buy, p("90.00"), 15);
        let pos = engine.get_position(1, "AAPL").unwrap();
        assert_eq!(pos.realized_pnl, p("100.00"));
        assert_eq!(pos.quantity, 5);
        assert_eq!(pos.avg_cost, p("90.00"));
    }

    #[test]
    fn test_unrealized_pnl_long_and_short() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.set_current_price("AAPL", p("105.00"));
        assert_eq!(engine.unrealized_pnl(1, "AAPL"), p("50.00"));

        engine.process_trade(2, "AAPL", Side::Sell, p("100.00"), 10);
        assert_eq!(engine.unrealized_pnl(2, "AAPL"), p("-50.00"));
    }

    #[test]
    fn test_flat_position_excluded_from_report_without_realized() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Sell, p("100.00"), 10);
        let report = engine.generate_user_report(1);
        assert!(report.positions.is_empty());
    }

    #[test]
    fn test_portfolio_report_sorted_descending() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Sell, p("110.00"), 10);
        engine.process_trade(2, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(2, "AAPL", Side::Sell, p("105.00"), 10);
        let portfolio = engine.generate_portfolio_report();
        assert_eq!(portfolio.reports.len(), 2);
        assert_eq!(portfolio.reports[0].user_id, 1);
        assert_eq!(portfolio.reports[1].user_id, 2);
        assert_eq!(portfolio.num_users, 2);
        assert_eq!(portfolio.total_realized_pnl, p("150.00"));
    }

    #[test]
    fn test_user_report_counts_positions_and_trades() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        engine.process_trade(1, "AAPL", Side::Buy, p("101.00"), 5);
        engine.process_trade(1, "GOOGL", Side::Sell, p("200.00"), 3);
        let report = engine.generate_user_report(1);
        assert_eq!(report.num_trades, 3);
        assert_eq!(report.num_positions, 2);
        assert_eq!(report.positions.len(), report.num_positions);
    }

    #[test]
    fn test_flush_deltas_are_incremental_not_absolute() {
        let mut engine = PnLEngine::new();
        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 10);
        let first = engine.flush_deltas();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].quantity_delta, 10);

        engine.process_trade(1, "AAPL", Side::Buy, p("100.00"), 5);
        let second = engine.flush_deltas();
        assert_eq!(second.len(), 1);
        // Delta since last flush is +5, not the absolute quantity of 15.
        assert_eq!(second[0].quantity_delta, 5);

        let third = engine.flush_deltas();
        assert!(third.is_empty());
    }
}
