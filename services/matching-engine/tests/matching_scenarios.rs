//! End-to-end matching scenarios across the full order-type vocabulary.

use matching_engine::{LiquidityFlag, OrderBook};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::rc::Rc;
use types::prelude::*;

fn px(s: &str) -> Price {
    Price::from_str(s).unwrap()
}

fn limit(id: u64, account: u64, side: Side, price: &str, qty: u32) -> Order {
    Order::limit(
        OrderId::new(id),
        AccountId::new(account),
        side,
        px(price),
        qty,
        TimeInForce::Gtc,
    )
    .unwrap()
}

fn limit_tif(id: u64, account: u64, side: Side, price: &str, qty: u32, tif: TimeInForce) -> Order {
    Order::limit(OrderId::new(id), AccountId::new(account), side, px(price), qty, tif).unwrap()
}

#[test]
fn simple_cross_empties_book() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Buy, "100.00", 100));
    book.submit(limit(2, 2, Side::Sell, "100.00", 100));

    assert_eq!(book.fills().len(), 1);
    let fill = &book.fills()[0];
    assert_eq!(fill.price, px("100.00"));
    assert_eq!(fill.quantity, 100);

    assert_eq!(book.lookup(OrderId::new(1)).unwrap().state, OrderState::Filled);
    assert_eq!(book.lookup(OrderId::new(2)).unwrap().state, OrderState::Filled);
    assert!(book.best_bid().is_none());
    assert!(book.best_ask().is_none());
}

#[test]
fn aggressor_trades_at_passive_price() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 100));
    book.submit(limit(2, 2, Side::Buy, "101.00", 100));

    assert_eq!(book.fills().len(), 1);
    assert_eq!(book.fills()[0].price, px("100.00"));
    assert_eq!(book.fills()[0].quantity, 100);
}

#[test]
fn iceberg_exhaustion_refresh_and_lost_priority() {
    let mut book = OrderBook::new("SIM");

    let iceberg = Order::iceberg(
        OrderId::new(1),
        AccountId::new(1),
        Side::Sell,
        px("100.00"),
        500,
        100,
        TimeInForce::Gtc,
    )
    .unwrap();
    book.submit(iceberg);

    // Competing order joins the level while the iceberg still has time
    // priority.
    book.submit(limit(2, 2, Side::Sell, "100.00", 50));

    // First buy exhausts the displayed slice; the iceberg refreshes.
    book.submit(limit(3, 3, Side::Buy, "100.00", 100));
    assert_eq!(book.fills().len(), 1);
    assert_eq!(book.fills()[0].sell_order_id, OrderId::new(1));
    assert_eq!(book.fills()[0].quantity, 100);

    let refreshed = book.lookup(OrderId::new(1)).unwrap();
    assert_eq!(refreshed.remaining, 400);
    assert_eq!(refreshed.display_qty(), 100);
    assert_eq!(refreshed.hidden_qty(), 300);

    // The refreshed slice sits behind the competing order.
    assert_eq!(book.best_ask().unwrap().id, OrderId::new(2));

    book.submit(limit(4, 4, Side::Buy, "100.00", 50));
    assert_eq!(book.fills().len(), 2);
    assert_eq!(book.fills()[1].sell_order_id, OrderId::new(2));
}

#[test]
fn iceberg_consumed_across_refreshes_in_one_sweep() {
    let mut book = OrderBook::new("SIM");
    let iceberg = Order::iceberg(
        OrderId::new(1),
        AccountId::new(1),
        Side::Sell,
        px("100.00"),
        200,
        100,
        TimeInForce::Gtc,
    )
    .unwrap();
    book.submit(iceberg);

    book.submit(limit(2, 2, Side::Buy, "100.00", 200));

    // Two slices, two fills, one submission.
    assert_eq!(book.fills().len(), 2);
    assert_eq!(book.fills()[0].quantity, 100);
    assert_eq!(book.fills()[1].quantity, 100);
    assert_eq!(book.lookup(OrderId::new(1)).unwrap().state, OrderState::Filled);
    assert!(book.best_ask().is_none());
}

#[test]
fn iceberg_last_slice_shows_remainder() {
    let mut book = OrderBook::new("SIM");
    let iceberg = Order::iceberg(
        OrderId::new(1),
        AccountId::new(1),
        Side::Sell,
        px("100.00"),
        250,
        100,
        TimeInForce::Gtc,
    )
    .unwrap();
    book.submit(iceberg);

    book.submit(limit(2, 2, Side::Buy, "100.00", 100));
    book.submit(limit(3, 3, Side::Buy, "100.00", 100));

    let last = book.lookup(OrderId::new(1)).unwrap();
    assert_eq!(last.remaining, 50);
    assert_eq!(last.display_qty(), 50);
    assert_eq!(last.hidden_qty(), 0);
}

#[test]
fn fok_rejected_on_insufficient_liquidity() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 50));

    book.submit(limit_tif(2, 2, Side::Buy, "100.00", 100, TimeInForce::Fok));

    assert!(book.fills().is_empty());
    let order = book.lookup(OrderId::new(2)).unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    assert_eq!(order.remaining, 100);
    // The resting ask is untouched.
    assert_eq!(book.best_ask().unwrap().remaining, 50);
}

#[test]
fn fok_fills_fully_across_levels() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 60));
    book.submit(limit(2, 2, Side::Sell, "100.50", 60));

    book.submit(limit_tif(3, 3, Side::Buy, "100.50", 100, TimeInForce::Fok));

    assert_eq!(book.fills().len(), 2);
    assert_eq!(book.fills()[0].quantity, 60);
    assert_eq!(book.fills()[1].quantity, 40);
    assert_eq!(book.lookup(OrderId::new(3)).unwrap().state, OrderState::Filled);
}

#[test]
fn ioc_partial_fills_then_cancels_remainder() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 30));

    book.submit(limit_tif(2, 2, Side::Buy, "100.00", 100, TimeInForce::Ioc));

    assert_eq!(book.fills().len(), 1);
    assert_eq!(book.fills()[0].quantity, 30);

    let order = book.lookup(OrderId::new(2)).unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    assert_eq!(order.remaining, 70);
    // The remainder never rests.
    assert!(book.best_bid().is_none());
}

#[test]
fn ioc_with_no_crossable_liquidity_cancels() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "101.00", 100));

    book.submit(limit_tif(2, 2, Side::Buy, "100.00", 50, TimeInForce::Ioc));

    assert!(book.fills().is_empty());
    assert_eq!(book.lookup(OrderId::new(2)).unwrap().state, OrderState::Cancelled);
}

#[test]
fn day_rests_like_gtc() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit_tif(1, 1, Side::Buy, "99.00", 100, TimeInForce::Day));

    // No session clock, no expiry: the order simply rests.
    assert_eq!(book.best_bid().unwrap().id, OrderId::new(1));
    assert_eq!(book.lookup(OrderId::new(1)).unwrap().state, OrderState::Active);
}

#[test]
fn stop_cascade_through_descending_liquidity() {
    let mut book = OrderBook::new("SIM");

    // Resting ask keeps the pre-trade reference at 98 so the sell stops
    // enqueue instead of triggering on placement.
    book.submit(limit(1, 1, Side::Sell, "98.00", 100));

    for (id, stop_price) in [(2u64, "96.50"), (3, "96.00"), (4, "95.50")] {
        let stop = Order::stop_market(
            OrderId::new(id),
            AccountId::new(id),
            Side::Sell,
            px(stop_price),
            100,
        )
        .unwrap();
        book.submit(stop);
    }
    assert_eq!(book.pending_stop_count(), 3);

    // Ladder of bids for the cascade to walk down.
    book.submit(limit(5, 5, Side::Buy, "96.40", 50));
    book.submit(limit(6, 6, Side::Buy, "96.00", 100));
    book.submit(limit(7, 7, Side::Buy, "95.50", 100));
    book.submit(limit(8, 8, Side::Buy, "95.00", 100));

    // Print at 96.40 trips the 96.50 stop; each triggered stop's market
    // sell prints lower and trips the next one.
    book.submit(limit(9, 9, Side::Sell, "96.40", 50));

    assert_eq!(book.pending_stop_count(), 0);
    let prices: Vec<Price> = book.fills().iter().map(|f| f.price).collect();
    assert_eq!(
        prices,
        vec![px("96.40"), px("96.00"), px("95.50"), px("95.00")]
    );
    for stop_id in [2u64, 3, 4] {
        assert_eq!(
            book.lookup(OrderId::new(stop_id)).unwrap().state,
            OrderState::Filled
        );
    }
    assert_eq!(book.last_trade_price(), Some(px("95.00")));
}

#[test]
fn stop_limit_converts_and_rests() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 50));
    book.submit(limit(2, 2, Side::Buy, "99.00", 50));

    // Stop-buy at 102 becoming a limit at 101.5; trigger it with a print
    // at 102.
    let stop = Order::stop_limit(
        OrderId::new(3),
        AccountId::new(3),
        Side::Buy,
        px("102.00"),
        px("101.50"),
        150,
    )
    .unwrap();
    book.submit(stop);
    // Reference with no prior trade is max(bid, ask) = 100 < 102.
    assert_eq!(book.pending_stop_count(), 1);

    // The aggressive buy sweeps the 100 level, then prints at 102, which
    // trips the stop.
    book.submit(limit(4, 4, Side::Sell, "102.00", 50));
    book.submit(limit(5, 5, Side::Buy, "102.00", 100));

    assert_eq!(book.pending_stop_count(), 0);
    let converted = book.lookup(OrderId::new(3)).unwrap();
    assert_eq!(converted.state, OrderState::Active);
    assert_eq!(converted.limit_price(), Some(px("101.50")));
    assert_eq!(book.best_bid().unwrap().id, OrderId::new(3));
}

#[test]
fn self_trade_vetoed_by_router() {
    let mut book = OrderBook::new("SIM");
    book.router_mut().set_self_trade_prevention(true);

    let veto_count = Rc::new(RefCell::new(0u32));
    let veto_clone = Rc::clone(&veto_count);
    book.router_mut()
        .register_self_trade_callback(move |_, _, _| {
            *veto_clone.borrow_mut() += 1;
        });

    book.submit(limit(1, 7, Side::Sell, "101.25", 50));
    book.submit(limit(2, 7, Side::Buy, "101.25", 50));

    // Matching proceeds, but no enriched fill is published.
    assert!(book.router().all_fills().is_empty());
    assert_eq!(book.router().self_trades_prevented(), 1);
    assert_eq!(*veto_count.borrow(), 1);
}

#[test]
fn router_enriches_fills_with_fees_and_accounts() {
    let mut book = OrderBook::new("SIM");
    book.router_mut().set_fee_schedule(FeeSchedule::new(
        Decimal::from_str_exact("0.0002").unwrap(),
        Decimal::from_str_exact("0.0005").unwrap(),
    ));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    book.router_mut().register_fill_callback(move |fill| {
        seen_clone.borrow_mut().push(fill.fill_id);
    });

    book.submit(limit(1, 10, Side::Sell, "100.00", 100));
    book.submit(limit(2, 20, Side::Buy, "100.00", 100));

    let fills = book.router().all_fills();
    assert_eq!(fills.len(), 1);
    let enhanced = &fills[0];

    assert_eq!(enhanced.fill_id, 1);
    assert_eq!(enhanced.symbol, "SIM");
    assert_eq!(enhanced.buy_account, AccountId::new(20));
    assert_eq!(enhanced.sell_account, AccountId::new(10));
    assert_eq!(enhanced.aggressor_side, Side::Buy);
    assert_eq!(enhanced.liquidity_flag, LiquidityFlag::Maker);

    // 10_000 notional: buyer is the taker here.
    assert_eq!(enhanced.buyer_fee, Decimal::from(5));
    assert_eq!(enhanced.seller_fee, Decimal::from(2));

    assert_eq!(*seen.borrow(), vec![1]);
    assert_eq!(
        book.router().fills_for_account(AccountId::new(10)).len(),
        1
    );
    assert_eq!(book.router().fills_for_symbol("SIM").len(), 1);
}

#[test]
fn cancel_is_idempotent() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Buy, "100.00", 100));

    assert!(book.cancel(OrderId::new(1)));
    assert!(!book.cancel(OrderId::new(1)));
    assert!(!book.cancel(OrderId::new(99)));

    assert_eq!(
        book.lookup(OrderId::new(1)).unwrap().state,
        OrderState::Cancelled
    );
}

#[test]
fn amend_replaces_and_loses_time_priority() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Buy, "100.00", 100));
    book.submit(limit(2, 2, Side::Buy, "100.00", 100));

    // Amending order 1 re-queues it behind order 2 at the same price.
    assert!(book.amend(OrderId::new(1), None, Some(80)));

    let amended = book.lookup(OrderId::new(1)).unwrap();
    assert_eq!(amended.quantity, 80);
    assert_eq!(amended.state, OrderState::Active);

    book.submit(limit(3, 3, Side::Sell, "100.00", 100));
    assert_eq!(book.fills()[0].buy_order_id, OrderId::new(2));
}

#[test]
fn amend_to_crossing_price_matches_immediately() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "101.00", 50));
    book.submit(limit(2, 2, Side::Buy, "100.00", 50));

    assert!(book.amend(OrderId::new(2), Some(px("101.00")), None));

    assert_eq!(book.fills().len(), 1);
    assert_eq!(book.fills()[0].price, px("101.00"));
    assert_eq!(book.lookup(OrderId::new(2)).unwrap().state, OrderState::Filled);
}

#[test]
fn amend_of_unknown_or_terminal_returns_false() {
    let mut book = OrderBook::new("SIM");
    assert!(!book.amend(OrderId::new(1), Some(px("100.00")), None));

    book.submit(limit(1, 1, Side::Buy, "100.00", 50));
    book.submit(limit(2, 2, Side::Sell, "100.00", 50));
    assert!(!book.amend(OrderId::new(1), Some(px("99.00")), None));
}

#[test]
fn market_depth_shows_display_only() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Buy, "99.00", 100));
    book.submit(limit(2, 2, Side::Buy, "99.00", 50));
    book.submit(limit(3, 3, Side::Buy, "98.50", 200));
    let iceberg = Order::iceberg(
        OrderId::new(4),
        AccountId::new(4),
        Side::Sell,
        px("100.00"),
        500,
        100,
        TimeInForce::Gtc,
    )
    .unwrap();
    book.submit(iceberg);

    let depth = book.market_depth(5);

    assert_eq!(depth.bids.len(), 2);
    assert_eq!(depth.bids[0].price, px("99.00"));
    assert_eq!(depth.bids[0].total_quantity, 150);
    assert_eq!(depth.bids[0].order_count, 2);
    assert_eq!(depth.bids[1].price, px("98.50"));

    // Only the iceberg's displayed slice is visible.
    assert_eq!(depth.asks.len(), 1);
    assert_eq!(depth.asks[0].total_quantity, 100);
}

#[test]
fn unlimited_market_sweep_consumes_every_level() {
    let mut book = OrderBook::new("SIM");
    for (id, price) in [(1u64, "100.00"), (2, "105.00"), (3, "120.00")] {
        book.submit(limit(id, id, Side::Sell, price, 10));
    }

    let market =
        Order::market(OrderId::new(4), AccountId::new(4), Side::Buy, 30, TimeInForce::Ioc)
            .unwrap();
    book.submit(market);

    // No slippage cap: the sweep walks every level.
    assert_eq!(book.fills().len(), 3);
    assert_eq!(book.fills()[2].price, px("120.00"));
    assert_eq!(book.lookup(OrderId::new(4)).unwrap().state, OrderState::Filled);
}

#[test]
fn quantity_accounting_is_conservative() {
    let mut book = OrderBook::new("SIM");
    book.submit(limit(1, 1, Side::Sell, "100.00", 70));
    book.submit(limit(2, 2, Side::Sell, "100.00", 50));
    book.submit(limit(3, 3, Side::Buy, "100.00", 100));

    let bought: u32 = book
        .fills()
        .iter()
        .filter(|f| f.buy_order_id == OrderId::new(3))
        .map(|f| f.quantity)
        .sum();
    let order = book.lookup(OrderId::new(3)).unwrap();
    assert_eq!(bought, order.quantity - order.remaining);

    for id in [1u64, 2] {
        let sold: u32 = book
            .fills()
            .iter()
            .filter(|f| f.sell_order_id == OrderId::new(id))
            .map(|f| f.quantity)
            .sum();
        let resting = book.lookup(OrderId::new(id)).unwrap();
        assert_eq!(sold, resting.quantity - resting.remaining);
        assert!(resting.remaining <= resting.quantity);
    }
}
