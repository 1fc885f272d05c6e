//! Determinism and recovery: event replay, snapshots, checkpoints.

use matching_engine::{OrderBook, ReplayEngine};
use proptest::prelude::*;
use tempfile::TempDir;
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

/// A session exercising every order kind plus cancels and amends.
fn run_mixed_session(book: &mut OrderBook) {
    book.submit(limit(1, 1, Side::Sell, "100.00", 100));
    book.submit(limit(2, 2, Side::Buy, "99.00", 80));

    let iceberg = Order::iceberg(
        OrderId::new(3),
        AccountId::new(3),
        Side::Sell,
        px("100.50"),
        300,
        100,
        TimeInForce::Gtc,
    )
    .unwrap();
    book.submit(iceberg);

    let stop = Order::stop_market(
        OrderId::new(4),
        AccountId::new(4),
        Side::Sell,
        px("98.50"),
        60,
    )
    .unwrap();
    book.submit(stop);

    book.submit(limit(5, 5, Side::Buy, "100.00", 50));

    let fok = Order::limit(
        OrderId::new(6),
        AccountId::new(6),
        Side::Buy,
        px("100.50"),
        500,
        TimeInForce::Fok,
    )
    .unwrap();
    book.submit(fok);

    book.amend(OrderId::new(2), Some(px("99.25")), None);
    book.cancel(OrderId::new(1));

    let market =
        Order::market(OrderId::new(7), AccountId::new(7), Side::Buy, 150, TimeInForce::Ioc)
            .unwrap();
    book.submit(market);

    // Takes out the amended bid; the sell stop at 98.50 stays pending.
    book.submit(limit(8, 8, Side::Sell, "99.25", 80));
}

#[test]
fn replay_from_saved_events_reproduces_fills() {
    let tmp = TempDir::new().unwrap();
    let events_path = tmp.path().join("session.events");

    let mut original = OrderBook::new("SIM");
    original.enable_logging();
    run_mixed_session(&mut original);
    assert!(!original.fills().is_empty());
    original.save_events(&events_path).unwrap();

    let mut replay = ReplayEngine::new("SIM");
    let loaded = replay.load_from_file(&events_path).unwrap();
    assert_eq!(loaded, original.event_count());

    replay.replay_instant();

    let validation = replay.validate_against(original.fills());
    assert!(validation.is_match(), "divergence: {validation:?}");
    assert_eq!(
        replay.book().last_trade_price(),
        original.last_trade_price()
    );
    assert_eq!(
        replay.book().pending_stop_count(),
        original.pending_stop_count()
    );
}

#[test]
fn clear_events_truncates_log() {
    let mut book = OrderBook::new("SIM");
    book.enable_logging();
    book.submit(limit(1, 1, Side::Buy, "100.00", 10));
    assert_eq!(book.event_count(), 1);

    book.clear_events();
    assert_eq!(book.event_count(), 0);

    book.disable_logging();
    book.submit(limit(2, 2, Side::Buy, "100.00", 10));
    assert_eq!(book.event_count(), 0);
}

#[test]
fn snapshot_roundtrip_restores_book_state() {
    let tmp = TempDir::new().unwrap();
    let snap_path = tmp.path().join("book.snap");

    let mut original = OrderBook::new("SIM");
    run_mixed_session(&mut original);
    original.save_snapshot(&snap_path).unwrap();

    let mut restored = OrderBook::new("SIM");
    restored.load_snapshot(&snap_path).unwrap();

    assert_eq!(
        restored.best_bid().map(|o| (o.id, o.remaining)),
        original.best_bid().map(|o| (o.id, o.remaining))
    );
    assert_eq!(
        restored.best_ask().map(|o| (o.id, o.remaining)),
        original.best_ask().map(|o| (o.id, o.remaining))
    );
    assert_eq!(restored.spread(), original.spread());
    assert_eq!(restored.fills(), original.fills());
    assert_eq!(restored.last_trade_price(), original.last_trade_price());
    assert_eq!(
        restored.pending_stop_count(),
        original.pending_stop_count()
    );
    assert_eq!(restored.orders_processed(), original.orders_processed());

    // Every order resolves to the same state after restoration.
    for id in 1..=8u64 {
        let original_state = original.lookup(OrderId::new(id)).map(|o| o.state);
        let restored_state = restored.lookup(OrderId::new(id)).map(|o| o.state);
        if original_state.map_or(false, |s| s != OrderState::Cancelled) {
            assert_eq!(original_state, restored_state, "order {id}");
        }
    }
}

#[test]
fn restored_book_keeps_matching_correctly() {
    let tmp = TempDir::new().unwrap();
    let snap_path = tmp.path().join("book.snap");

    let mut original = OrderBook::new("SIM");
    original.submit(limit(1, 1, Side::Sell, "100.00", 100));
    original.submit(limit(2, 2, Side::Sell, "100.00", 50));
    original.submit(limit(3, 3, Side::Buy, "99.00", 50));
    original.save_snapshot(&snap_path).unwrap();

    let mut restored = OrderBook::new("SIM");
    restored.load_snapshot(&snap_path).unwrap();

    // Time priority survives the round-trip: order 1 fills first.
    restored.submit(limit(10, 10, Side::Buy, "100.00", 120));
    assert_eq!(restored.fills().len(), 2);
    assert_eq!(restored.fills()[0].sell_order_id, OrderId::new(1));
    assert_eq!(restored.fills()[0].quantity, 100);
    assert_eq!(restored.fills()[1].sell_order_id, OrderId::new(2));
    assert_eq!(restored.fills()[1].quantity, 20);
}

#[test]
fn snapshot_rejects_wrong_symbol() {
    let tmp = TempDir::new().unwrap();
    let snap_path = tmp.path().join("book.snap");

    let mut original = OrderBook::new("SIM");
    original.submit(limit(1, 1, Side::Buy, "100.00", 10));
    original.save_snapshot(&snap_path).unwrap();

    let mut other = OrderBook::new("OTHER");
    other.submit(limit(9, 9, Side::Buy, "50.00", 5));
    assert!(other.load_snapshot(&snap_path).is_err());
    // The failed load leaves the engine untouched.
    assert_eq!(other.best_bid().unwrap().id, OrderId::new(9));
}

#[test]
fn checkpoint_recovery_replays_incremental_events() {
    let tmp = TempDir::new().unwrap();
    let snap_path = tmp.path().join("check.snap");
    let events_path = tmp.path().join("check.events");

    let mut original = OrderBook::new("SIM");
    original.enable_logging();

    // Phase 1: captured by the snapshot.
    original.submit(limit(1, 1, Side::Sell, "100.00", 100));
    original.submit(limit(2, 2, Side::Buy, "100.00", 40));
    original.save_snapshot(&snap_path).unwrap();

    // Phase 2: only present in the event file.
    original.submit(limit(3, 3, Side::Buy, "100.00", 30));
    original.cancel(OrderId::new(2));
    original.submit(limit(4, 4, Side::Buy, "99.00", 25));
    original.save_events(&events_path).unwrap();

    let mut recovered = OrderBook::new("SIM");
    let applied = recovered
        .recover_from_checkpoint(&snap_path, &events_path)
        .unwrap();
    // NEW(3), CANCEL(2), NEW(4); fills and phase-1 events are skipped.
    assert_eq!(applied, 3);

    assert_eq!(recovered.fills(), original.fills());
    assert_eq!(
        recovered.best_bid().map(|o| o.id),
        original.best_bid().map(|o| o.id)
    );
    assert_eq!(
        recovered.best_ask().map(|o| (o.id, o.remaining)),
        original.best_ask().map(|o| (o.id, o.remaining))
    );
    assert_eq!(recovered.last_trade_price(), original.last_trade_price());
}

// ── Property: replay determinism over arbitrary order streams ────────

#[derive(Debug, Clone)]
enum Action {
    Limit {
        side: Side,
        price_idx: usize,
        qty: u32,
        tif_idx: usize,
        account: u64,
    },
    Market {
        side: Side,
        qty: u32,
        account: u64,
    },
    Cancel {
        target: u64,
    },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (
            prop::bool::ANY,
            0usize..5,
            1u32..200,
            0usize..4,
            1u64..4
        )
            .prop_map(|(buy, price_idx, qty, tif_idx, account)| Action::Limit {
                side: if buy { Side::Buy } else { Side::Sell },
                price_idx,
                qty,
                tif_idx,
                account,
            }),
        1 => (prop::bool::ANY, 1u32..100, 1u64..4).prop_map(|(buy, qty, account)| {
            Action::Market {
                side: if buy { Side::Buy } else { Side::Sell },
                qty,
                account,
            }
        }),
        1 => (1u64..40).prop_map(|target| Action::Cancel { target }),
    ]
}

fn apply_actions(book: &mut OrderBook, actions: &[Action]) {
    const PRICES: [&str; 5] = ["99.00", "99.50", "100.00", "100.50", "101.00"];
    const TIFS: [TimeInForce; 4] = [
        TimeInForce::Gtc,
        TimeInForce::Day,
        TimeInForce::Ioc,
        TimeInForce::Fok,
    ];

    let mut next_id = 1u64;
    for action in actions {
        match action {
            Action::Limit {
                side,
                price_idx,
                qty,
                tif_idx,
                account,
            } => {
                let order = Order::limit(
                    OrderId::new(next_id),
                    AccountId::new(*account),
                    *side,
                    px(PRICES[*price_idx]),
                    *qty,
                    TIFS[*tif_idx],
                )
                .unwrap();
                next_id += 1;
                book.submit(order);
            }
            Action::Market { side, qty, account } => {
                let order = Order::market(
                    OrderId::new(next_id),
                    AccountId::new(*account),
                    *side,
                    *qty,
                    TimeInForce::Ioc,
                )
                .unwrap();
                next_id += 1;
                book.submit(order);
            }
            Action::Cancel { target } => {
                book.cancel(OrderId::new(*target));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_replay_reproduces_any_session(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let mut original = OrderBook::new("SIM");
        original.enable_logging();
        apply_actions(&mut original, &actions);

        let mut replay = ReplayEngine::new("SIM");
        replay.load_events(original.events().to_vec());
        replay.replay_instant();

        let validation = replay.validate_against(original.fills());
        prop_assert!(validation.is_match(), "divergence: {:?}", validation);
    }

    #[test]
    fn prop_book_invariants_hold(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let mut book = OrderBook::new("SIM");
        apply_actions(&mut book, &actions);

        for id in 1..200u64 {
            if let Some(order) = book.lookup(OrderId::new(id)) {
                prop_assert!(order.remaining <= order.quantity);
                prop_assert_eq!(
                    order.display_qty() + order.hidden_qty(),
                    order.remaining
                );
            }
        }

        if let Some(last) = book.fills().last() {
            prop_assert_eq!(book.last_trade_price(), Some(last.price));
        }

        // Bid/ask never remain crossed after matching settles.
        if let Some(spread) = book.spread() {
            prop_assert!(spread >= rust_decimal::Decimal::ZERO);
        }
    }
}
