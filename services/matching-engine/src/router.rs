//! Fill router: post-trade enrichment and fan-out
//!
//! Every raw fill produced by the matching core passes through here before
//! it is published anywhere else. The router may veto on self-trade;
//! otherwise it classifies liquidity, prices fees, assigns a monotonic fill
//! id, indexes the enriched fill by account and symbol, and dispatches it to
//! registered subscribers. A panicking subscriber is isolated and logged;
//! it can never corrupt engine state.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};
use types::prelude::*;

/// Role of the passive side of the match.
///
/// Normal single-aggressor matching always produces `Maker`; `MakerMaker`
/// is reserved for auction-style matching where both sides rested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityFlag {
    Maker,
    Taker,
    MakerMaker,
}

/// A raw fill enriched with participants, fees and classification.
#[derive(Debug, Clone)]
pub struct EnhancedFill {
    /// Monotonically increasing, unique within a session.
    pub fill_id: u64,
    pub fill: Fill,
    pub symbol: String,
    pub buy_account: AccountId,
    pub sell_account: AccountId,
    /// Side of the incoming (aggressive) order.
    pub aggressor_side: Side,
    pub liquidity_flag: LiquidityFlag,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
}

type FillCallback = Box<dyn FnMut(&EnhancedFill)>;
type SelfTradeCallback = Box<dyn FnMut(AccountId, &Order, &Order)>;

pub struct FillRouter {
    prevention_enabled: bool,
    fee_schedule: FeeSchedule,
    next_fill_id: u64,
    fills: Vec<EnhancedFill>,
    by_account: HashMap<AccountId, Vec<usize>>,
    by_symbol: HashMap<String, Vec<usize>>,
    self_trades_prevented: u64,
    fill_callbacks: Vec<FillCallback>,
    self_trade_callbacks: Vec<SelfTradeCallback>,
}

impl FillRouter {
    pub fn new(prevention_enabled: bool) -> Self {
        Self {
            prevention_enabled,
            fee_schedule: FeeSchedule::default(),
            next_fill_id: 1,
            fills: Vec::new(),
            by_account: HashMap::new(),
            by_symbol: HashMap::new(),
            self_trades_prevented: 0,
            fill_callbacks: Vec::new(),
            self_trade_callbacks: Vec::new(),
        }
    }

    pub fn set_self_trade_prevention(&mut self, enabled: bool) {
        self.prevention_enabled = enabled;
    }

    pub fn self_trade_prevention(&self) -> bool {
        self.prevention_enabled
    }

    pub fn set_fee_schedule(&mut self, schedule: FeeSchedule) {
        self.fee_schedule = schedule;
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.fee_schedule
    }

    /// Subscribe to enriched fills. Callbacks run synchronously in
    /// registration order.
    pub fn register_fill_callback(&mut self, callback: impl FnMut(&EnhancedFill) + 'static) {
        self.fill_callbacks.push(Box::new(callback));
    }

    /// Subscribe to self-trade vetoes: (account, aggressor, passive).
    pub fn register_self_trade_callback(
        &mut self,
        callback: impl FnMut(AccountId, &Order, &Order) + 'static,
    ) {
        self.self_trade_callbacks.push(Box::new(callback));
    }

    /// Route one raw fill. Returns false when the fill was vetoed
    /// (self-trade): no EnhancedFill is produced and no fill callback runs.
    pub fn route_fill(
        &mut self,
        fill: &Fill,
        aggressor: &Order,
        passive: &Order,
        symbol: &str,
    ) -> bool {
        let (buy_account, sell_account) = match aggressor.side {
            Side::Buy => (aggressor.account, passive.account),
            Side::Sell => (passive.account, aggressor.account),
        };

        if self.prevention_enabled && buy_account == sell_account {
            self.self_trades_prevented += 1;
            debug!(
                account = %buy_account,
                aggressor = %aggressor.id,
                passive = %passive.id,
                "self-trade prevented"
            );
            for callback in &mut self.self_trade_callbacks {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| callback(buy_account, aggressor, passive)));
                if outcome.is_err() {
                    error!("self-trade callback panicked; continuing");
                }
            }
            return false;
        }

        let notional = fill.notional();
        let maker_fee = self.fee_schedule.maker_fee(notional);
        let taker_fee = self.fee_schedule.taker_fee(notional);
        let (buyer_fee, seller_fee) = match aggressor.side {
            Side::Buy => (taker_fee, maker_fee),
            Side::Sell => (maker_fee, taker_fee),
        };

        let fill_id = self.next_fill_id;
        self.next_fill_id += 1;

        let enhanced = EnhancedFill {
            fill_id,
            fill: fill.clone(),
            symbol: symbol.to_string(),
            buy_account,
            sell_account,
            aggressor_side: aggressor.side,
            liquidity_flag: LiquidityFlag::Maker,
            buyer_fee,
            seller_fee,
        };

        let index = self.fills.len();
        self.by_account.entry(buy_account).or_default().push(index);
        if sell_account != buy_account {
            self.by_account.entry(sell_account).or_default().push(index);
        }
        self.by_symbol
            .entry(symbol.to_string())
            .or_default()
            .push(index);
        self.fills.push(enhanced);

        let published = &self.fills[index];
        for callback in &mut self.fill_callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(published)));
            if outcome.is_err() {
                error!(fill_id, "fill callback panicked; continuing");
            }
        }

        true
    }

    pub fn all_fills(&self) -> &[EnhancedFill] {
        &self.fills
    }

    pub fn fills_for_account(&self, account: AccountId) -> Vec<&EnhancedFill> {
        self.by_account
            .get(&account)
            .map(|indices| indices.iter().map(|&i| &self.fills[i]).collect())
            .unwrap_or_default()
    }

    pub fn fills_for_symbol(&self, symbol: &str) -> Vec<&EnhancedFill> {
        self.by_symbol
            .get(symbol)
            .map(|indices| indices.iter().map(|&i| &self.fills[i]).collect())
            .unwrap_or_default()
    }

    pub fn fill_by_id(&self, fill_id: u64) -> Option<&EnhancedFill> {
        self.fills.iter().find(|fill| fill.fill_id == fill_id)
    }

    pub fn total_fills(&self) -> u64 {
        self.fills.len() as u64
    }

    pub fn self_trades_prevented(&self) -> u64 {
        self.self_trades_prevented
    }

    /// Drop accumulated fills and indices; configuration and counters for
    /// id assignment are kept.
    pub fn clear_fills(&mut self) {
        self.fills.clear();
        self.by_account.clear();
        self.by_symbol.clear();
    }
}

impl std::fmt::Debug for FillRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillRouter")
            .field("prevention_enabled", &self.prevention_enabled)
            .field("fills", &self.fills.len())
            .field("self_trades_prevented", &self.self_trades_prevented)
            .field("fill_callbacks", &self.fill_callbacks.len())
            .finish()
    }
}
