//! Own trade fills with round-trip ("ping/pong") match fields.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Price, Side, Size};

/// A fill of one of our orders.
///
/// The `matched_*` fields record how much of this trade has been offset
/// by opposite-side fills. A trade is closed once `matched_qty >= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub price: Price,
    pub quantity: Size,
    pub side: Side,
    pub time_ms: u64,
    /// `|price * quantity|`.
    pub value: Decimal,
    /// Set once the trade has been (partially) matched as a pong.
    pub is_pong: bool,
    pub matched_qty: Size,
    /// Volume-weighted price of the matched fills.
    pub matched_price: Price,
    pub matched_time_ms: u64,
    pub matched_value: Decimal,
    /// Residual `|quantity*price - matched_qty*matched_price|` once closed.
    pub matched_diff: Decimal,
    pub fee: Decimal,
}

impl Trade {
    pub fn new(side: Side, price: Price, quantity: Size, is_pong: bool, time_ms: u64) -> Self {
        Self {
            trade_id: format!("{}", uuid::Uuid::new_v4()),
            price,
            quantity,
            side,
            time_ms,
            value: quantity.notional(price).abs(),
            is_pong,
            matched_qty: Size::ZERO,
            matched_price: Price::ZERO,
            matched_time_ms: 0,
            matched_value: Decimal::ZERO,
            matched_diff: Decimal::ZERO,
            fee: Decimal::ZERO,
        }
    }

    /// Quantity still available to be matched.
    pub fn open_quantity(&self) -> Size {
        self.quantity - self.matched_qty
    }

    pub fn is_closed(&self) -> bool {
        self.matched_qty >= self.quantity
    }
}
