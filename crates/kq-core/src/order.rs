//! Order-related types and identifiers.
//!
//! Provides the quote side, order status, client order ID and the
//! tracked `Order` record owned by the order lifecycle manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Price, Size};

/// Quote side: bid (buy) or ask (sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Whether `price` on this side is strictly better-for-the-book than `other`,
    /// i.e. `other` would be deprecated by a quote at `price`.
    ///
    /// A bid at `price` deprecates anything higher; an ask deprecates anything lower.
    pub fn deprecates(&self, price: Price, other: Price) -> bool {
        match self {
            Self::Bid => price < other,
            Self::Ask => price > other,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Exchange-side order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged by the exchange.
    Waiting,
    /// Resting on the book.
    Working,
    /// Filled, canceled or rejected.
    Terminated,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Locally generated order identity, stable across retries and replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Fresh id of the form `kq_{timestamp_ms}_{uuid_short}`.
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("kq_{ts}_{uuid_short}"))
    }

    /// Wrap an id echoed back by the venue.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of our own orders as tracked locally.
///
/// Created on submission (status `Waiting`), updated on exchange
/// acknowledgement/fill, removed once `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Local identity.
    pub order_id: ClientOrderId,
    /// Exchange identity, known after acknowledgement.
    #[serde(default)]
    pub exchange_id: Option<String>,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    /// Quantity filled by the most recent update (zero when none).
    #[serde(default)]
    pub trade_quantity: Size,
    pub status: OrderStatus,
    /// Whether this order was priced to close a previous ping.
    #[serde(default)]
    pub is_pong: bool,
    /// Orders without post-only preference are managed externally.
    #[serde(default)]
    pub prefer_post_only: bool,
    /// Submission timestamp (unix ms).
    pub time_ms: u64,
}

impl Order {
    /// Create a new waiting order placed by the quoting engine.
    pub fn new(side: Side, price: Price, quantity: Size, is_pong: bool, time_ms: u64) -> Self {
        Self {
            order_id: ClientOrderId::new(),
            exchange_id: None,
            side,
            price,
            quantity,
            trade_quantity: Size::ZERO,
            status: OrderStatus::Waiting,
            is_pong,
            prefer_post_only: true,
            time_ms,
        }
    }

    /// Amount held by this order in its funding currency
    /// (base for asks, quote for bids).
    pub fn held_amount(&self) -> rust_decimal::Decimal {
        match self.side {
            Side::Ask => self.quantity.inner(),
            Side::Bid => self.quantity.notional(self.price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_deprecates() {
        let p100 = Price::new(dec!(100));
        let p101 = Price::new(dec!(101));
        assert!(Side::Bid.deprecates(p100, p101));
        assert!(!Side::Bid.deprecates(p101, p100));
        assert!(Side::Ask.deprecates(p101, p100));
        assert!(!Side::Ask.deprecates(p100, p100));
    }

    #[test]
    fn test_held_amount_per_side() {
        let bid = Order::new(Side::Bid, Price::new(dec!(100)), Size::new(dec!(2)), false, 0);
        let ask = Order::new(Side::Ask, Price::new(dec!(100)), Size::new(dec!(2)), false, 0);
        assert_eq!(bid.held_amount(), dec!(200));
        assert_eq!(ask.held_amount(), dec!(2));
    }

    #[test]
    fn test_client_order_id_prefix() {
        let id = ClientOrderId::new();
        assert!(id.as_str().starts_with("kq_"));
    }
}
