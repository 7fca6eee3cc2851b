//! Public market trades, bucketed per minute.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kq_core::{Price, Side, Size};

/// Public trade seen on the market feed. `side` is the maker side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTrade {
    pub price: Price,
    pub quantity: Size,
    pub side: Side,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MarketTakers {
    trades: Vec<MarketTrade>,
    /// Taker buys (lifted asks) over the last closed minute.
    pub takers_buy_size_60s: Decimal,
    /// Taker sells (hit bids) over the last closed minute.
    pub takers_sell_size_60s: Decimal,
}

impl MarketTakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trade: MarketTrade) {
        self.trades.push(trade);
    }

    pub fn pending(&self) -> usize {
        self.trades.len()
    }

    /// Close the current bucket.
    pub fn timer_60s(&mut self) {
        let (mut buy, mut sell) = (Decimal::ZERO, Decimal::ZERO);
        for trade in self.trades.drain(..) {
            match trade.side {
                Side::Bid => sell += trade.quantity.inner(),
                Side::Ask => buy += trade.quantity.inner(),
            }
        }
        self.takers_buy_size_60s = buy;
        self.takers_sell_size_60s = sell;
    }
}
