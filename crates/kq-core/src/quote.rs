//! Two-sided quote with a per-side state explaining why a side is (not) quoting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Price, Side, Size};

/// Why a quote side is or is not live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteState {
    Disconnected,
    Live,
    DisabledQuotes,
    MissingData,
    UnknownHeld,
    WidthMustBeSmaller,
    TbpHeld,
    BulletsHeld,
    MaxTradesSeconds,
    WaitingPing,
    DepletedFunds,
    Crossed,
    UpTrendHeld,
    DownTrendHeld,
}

impl QuoteState {
    pub const ALL: [QuoteState; 14] = [
        Self::Disconnected,
        Self::Live,
        Self::DisabledQuotes,
        Self::MissingData,
        Self::UnknownHeld,
        Self::WidthMustBeSmaller,
        Self::TbpHeld,
        Self::BulletsHeld,
        Self::MaxTradesSeconds,
        Self::WaitingPing,
        Self::DepletedFunds,
        Self::Crossed,
        Self::UpTrendHeld,
        Self::DownTrendHeld,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Live => "Live",
            Self::DisabledQuotes => "DisabledQuotes",
            Self::MissingData => "MissingData",
            Self::UnknownHeld => "UnknownHeld",
            Self::WidthMustBeSmaller => "WidthMustBeSmaller",
            Self::TbpHeld => "TBPHeld",
            Self::BulletsHeld => "BulletsHeld",
            Self::MaxTradesSeconds => "MaxTradesSeconds",
            Self::WaitingPing => "WaitingPing",
            Self::DepletedFunds => "DepletedFunds",
            Self::Crossed => "Crossed",
            Self::UpTrendHeld => "UpTrendHeld",
            Self::DownTrendHeld => "DownTrendHeld",
        }
    }
}

impl fmt::Display for QuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub state: QuoteState,
    pub is_pong: bool,
}

impl Quote {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            price: Price::ZERO,
            size: Size::ZERO,
            state: QuoteState::MissingData,
            is_pong: false,
        }
    }

    /// Nothing to quote on this side.
    pub fn is_empty(&self) -> bool {
        self.size.is_zero() || self.price.is_zero()
    }

    /// Keep state but place nothing new (an existing order already covers it).
    pub fn skip(&mut self) {
        self.size = Size::ZERO;
    }

    /// Remove the side from the market with `reason`.
    pub fn clear(&mut self, reason: QuoteState) {
        self.price = Price::ZERO;
        self.size = Size::ZERO;
        self.state = reason;
    }

    /// Whether a quote at our price makes a resting order at `other` stale.
    pub fn deprecates(&self, other: Price) -> bool {
        self.side.deprecates(self.price, other)
    }

    /// Mark this side `Live` when it stays strictly behind the opposite quote,
    /// otherwise `Crossed`. Returns true when crossed.
    pub fn check_crossed(&mut self, opposite: &Quote) -> bool {
        if self.is_empty() {
            return false;
        }
        if opposite.is_empty() || self.deprecates(opposite.price) {
            self.state = QuoteState::Live;
            return false;
        }
        self.state = QuoteState::Crossed;
        true
    }
}

/// Both sides of the quote plus the super-spread flag of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotes {
    pub bid: Quote,
    pub ask: Quote,
    pub super_spread: bool,
}

impl Default for Quotes {
    fn default() -> Self {
        Self {
            bid: Quote::new(Side::Bid),
            ask: Quote::new(Side::Ask),
            super_spread: false,
        }
    }
}

impl Quotes {
    pub fn side(&self, side: Side) -> &Quote {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut Quote {
        match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        }
    }

    /// Set the same state on both sides.
    pub fn set_states(&mut self, state: QuoteState) {
        self.bid.state = state;
        self.ask.state = state;
    }

    /// Clear both sides with the same reason.
    pub fn clear(&mut self, reason: QuoteState) {
        self.bid.clear(reason);
        self.ask.clear(reason);
    }

    /// Run crossed detection on both sides. Returns true if either side crossed.
    pub fn check_crossed_quotes(&mut self) -> bool {
        let ask = self.ask.clone();
        let bid_crossed = self.bid.check_crossed(&ask);
        let bid = self.bid.clone();
        let ask_crossed = self.ask.check_crossed(&bid);
        bid_crossed | ask_crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quotes(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> Quotes {
        let mut q = Quotes::default();
        q.bid.price = Price::new(bid);
        q.bid.size = Size::new(dec!(1));
        q.ask.price = Price::new(ask);
        q.ask.size = Size::new(dec!(1));
        q
    }

    #[test]
    fn test_clear_sets_reason_and_zero_size() {
        let mut q = quotes(dec!(100), dec!(101));
        q.bid.clear(QuoteState::DepletedFunds);
        assert!(q.bid.is_empty());
        assert_eq!(q.bid.state, QuoteState::DepletedFunds);
    }

    #[test]
    fn test_uncrossed_quotes_go_live() {
        let mut q = quotes(dec!(100), dec!(101));
        assert!(!q.check_crossed_quotes());
        assert_eq!(q.bid.state, QuoteState::Live);
        assert_eq!(q.ask.state, QuoteState::Live);
    }

    #[test]
    fn test_crossed_quotes_detected_on_both_sides() {
        let mut q = quotes(dec!(101), dec!(101));
        assert!(q.check_crossed_quotes());
        assert_eq!(q.bid.state, QuoteState::Crossed);
        assert_eq!(q.ask.state, QuoteState::Crossed);
    }

    #[test]
    fn test_one_sided_quote_goes_live() {
        let mut q = quotes(dec!(100), dec!(101));
        q.ask.clear(QuoteState::TbpHeld);
        assert!(!q.check_crossed_quotes());
        assert_eq!(q.bid.state, QuoteState::Live);
        assert_eq!(q.ask.state, QuoteState::TbpHeld);
    }
}
