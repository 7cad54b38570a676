// auction_core/src/main.rs
//
// The simulator driver: generates random orders across a pool of users and
// symbols, feeds them through the matching engine, folds resulting trades
// into the P&L engine, persists everything to an in-memory store, and runs
// a same-day reconciliation pass at the end.
//
// Flags: --orders N (default 10000), --users U (default 100).

use auction_core::{InMemoryStore, MatchingEngine, PersistenceStore, PnLEngine, Price, Reconciler, Side};
use auction_core::config::Settings;
use auction_core::persistence::{OrderRow, TradeRow};
use rand::Rng;

struct CliArgs {
    num_orders: u32,
    num_users: u32,
}

fn parse_args() -> CliArgs {
    let settings = Settings::load().unwrap_or_default();
    let mut args = CliArgs {
        num_orders: settings.simulator.num_orders,
        num_users: settings.simulator.num_users,
    };

    let raw: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "--orders" => {
                if let Some(v) = raw.get(i + 1).and_then(|s| s.parse().ok()) {
                    args.num_orders = v;
                }
                i += 2;
            }
            "--users" => {
                if let Some(v) = raw.get(i + 1).and_then(|s| s.parse().ok()) {
                    args.num_users = v;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    args
}

fn random_order(rng: &mut impl Rng, settings: &Settings, num_users: u32) -> (u64, String, Side, Price, i64) {
    let symbols = &settings.trading.symbols;
    let symbol = symbols[rng.gen_range(0..symbols.len())].clone();
    let user_id = rng.gen_range(1..=num_users.max(1) as u64);
    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
    let price_f = rng.gen_range(settings.trading.min_price..=settings.trading.max_price);
    let tick = settings.trading.price_tick;
    let quantized = (price_f / tick).round() * tick;
    let price = Price::from_float(quantized);
    let quantity = rng.gen_range(settings.trading.min_quantity..=settings.trading.max_quantity) as i64;
    (user_id, symbol, side, price, quantity)
}

fn run(num_orders: u32, num_users: u32) -> Result<(), auction_core::PersistenceError> {
    let settings = Settings::load().unwrap_or_default();
    settings.init_logging();

    log::info!(
        "starting simulation: {} orders across {} users",
        num_orders,
        num_users
    );

    let mut engine = MatchingEngine::new();
    let mut pnl = PnLEngine::new();
    let mut store = InMemoryStore::new();
    let mut rng = rand::thread_rng();

    for _ in 0..num_orders {
        let (user_id, symbol, side, price, quantity) = random_order(&mut rng, &settings, num_users);

        let order_ids = store.bulk_insert_orders(&[OrderRow {
            user_id,
            symbol: symbol.clone(),
            side,
            price,
            quantity,
        }])?;
        let persisted_order_id = order_ids[0];

        let result = match engine.submit_order(user_id, &symbol, side, price, quantity) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("order rejected: {}", e);
                continue;
            }
        };

        if !result.trades.is_empty() {
            let trade_rows: Vec<TradeRow> = result
                .trades
                .iter()
                .map(|t| TradeRow {
                    buy_order_id: t.buy_order_id,
                    sell_order_id: t.sell_order_id,
                    symbol: t.symbol.clone(),
                    price: t.price,
                    quantity: t.quantity,
                })
                .collect();
            store.bulk_insert_trades(&trade_rows)?;

            for trade in &result.trades {
                let buy_order = engine.get_order(trade.buy_order_id);
                let sell_order = engine.get_order(trade.sell_order_id);
                if let (Some(buy_order), Some(sell_order)) = (buy_order, sell_order) {
                    pnl.process_match(
                        buy_order.user_id,
                        sell_order.user_id,
                        &trade.symbol,
                        trade.price,
                        trade.quantity,
                    );
                }
            }
        }

        if let Some(order) = engine.get_order(persisted_order_id) {
            store.update_order_status(persisted_order_id, order.status)?;
        }
    }

    let portfolio = pnl.generate_portfolio_report();
    log::info!(
        "{} user(s) with a reportable position, total P&L {}",
        portfolio.num_users,
        portfolio.total_pnl
    );

    for delta in pnl.flush_deltas() {
        store.upsert_position(
            delta.user_id,
            &delta.symbol,
            delta.quantity_delta,
            delta.avg_cost,
            delta.realized_pnl_delta,
        )?;
    }

    let stats = engine.statistics();
    log::info!(
        "matching done: {} orders, {} trades, {:.3}ms avg latency, {} symbols, {:.1}% match rate",
        stats.total_orders,
        stats.total_trades,
        stats.average_latency_ms,
        stats.symbols_traded,
        stats.match_rate * 100.0
    );

    let report = Reconciler::reconcile_trades(&mut store, "today", 0)?;
    log::info!(
        "reconciliation: {}/{} trades matched, {:.2}% accuracy, {} discrepancies",
        report.matched_trades,
        report.total_trades,
        report.accuracy,
        report.discrepancies.len()
    );

    if let Some(stats) = Reconciler::accuracy_stats(&store, 30)? {
        log::info!(
            "accuracy over last {} run(s): avg {:.2}%, min {:.2}%, max {:.2}%",
            stats.total_checks,
            stats.average,
            stats.min,
            stats.max
        );
    }

    Ok(())
}

fn main() {
    let args = parse_args();
    match run(args.num_orders, args.num_users) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("simulation failed: {}", e);
            std::process::exit(1);
        }
    }
}
