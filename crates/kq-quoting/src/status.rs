//! Snapshots published after each cycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kq_core::{Price, QuoteState, Wallet};

use crate::ewma::EwmaStats;
use crate::lifecycle::OrderCounts;
use crate::position::Target;
use crate::protection::SideApr;
use crate::stdev::StdevStats;

/// Why each side is (or is not) quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStatus {
    pub bid_status: QuoteState,
    pub ask_status: QuoteState,
    #[serde(rename = "sideAPR")]
    pub side_apr: SideApr,
    pub quotes_in_memory_waiting: u32,
    pub quotes_in_memory_working: u32,
    pub quotes_in_memory_zombies: u32,
}

impl QuoteStatus {
    pub fn new(bid: QuoteState, ask: QuoteState, side_apr: SideApr, counts: OrderCounts) -> Self {
        Self {
            bid_status: bid,
            ask_status: ask,
            side_apr,
            quotes_in_memory_waiting: counts.waiting,
            quotes_in_memory_working: counts.working,
            quotes_in_memory_zombies: counts.zombies,
        }
    }
}

impl Default for QuoteStatus {
    fn default() -> Self {
        Self::new(
            QuoteState::MissingData,
            QuoteState::MissingData,
            SideApr::Off,
            OrderCounts::default(),
        )
    }
}

/// Market statistics for charting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub ewma: EwmaStats,
    pub stdev: StdevStats,
    pub fair_value: Price,
    pub trades_buy_size: Decimal,
    pub trades_sell_size: Decimal,
}

/// Wallets with their derived values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStatus {
    pub base: Wallet,
    pub quote: Wallet,
    pub target: Target,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_status_json_keys() {
        let status = QuoteStatus::new(
            QuoteState::Live,
            QuoteState::TbpHeld,
            SideApr::Buy,
            OrderCounts {
                waiting: 1,
                working: 2,
                zombies: 0,
            },
        );
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["sideAPR"], "Buy");
        assert_eq!(json["quotesInMemoryWorking"], 2);
        assert!(json.get("bidStatus").is_some());
    }
}
