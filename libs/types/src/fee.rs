//! Fee calculation types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Two-rate maker/taker fee schedule.
///
/// Rates are fractions of notional (price × quantity): the maker rate
/// applies to the resting side of a match, the taker rate to the aggressor.
/// A negative maker rate models a rebate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }

    /// Fee charged to the resting side for a trade of the given notional.
    pub fn maker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.maker_rate
    }

    /// Fee charged to the aggressive side for a trade of the given notional.
    pub fn taker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.taker_rate
    }
}

impl Default for FeeSchedule {
    /// 2 bps maker / 5 bps taker.
    fn default() -> Self {
        Self {
            maker_rate: Decimal::from_str_exact("0.0002").unwrap(),
            taker_rate: Decimal::from_str_exact("0.0005").unwrap(),
        }
    }
}
